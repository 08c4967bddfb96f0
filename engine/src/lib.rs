pub mod regression;
pub mod timers;

/// Deterministic, tick-driven game logic.
///
/// `step` mutates the state in place and pushes side effects into `effects` instead of
/// performing them; the host applies them.
pub trait TickLogic {
    type State;
    type Input;
    type Effect;

    fn initial_state(&self) -> Self::State;
    fn step(&self, state: &mut Self::State, input: Self::Input, effects: &mut Vec<Self::Effect>);
}

/// Owns one live state plus the journal of inputs that produced it.
///
/// Rewinding replays the journal prefix from a fresh initial state instead of keeping a
/// snapshot per frame; `TickLogic::step` is deterministic so the result is identical.
#[derive(Debug)]
pub struct HeadlessRunner<G: TickLogic> {
    logic: G,
    state: G::State,
    journal: Vec<G::Input>,
    effects: Vec<G::Effect>,
}

impl<G: TickLogic> HeadlessRunner<G> {
    pub fn new(logic: G) -> Self {
        let state = logic.initial_state();
        Self {
            logic,
            state,
            journal: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn logic(&self) -> &G {
        &self.logic
    }

    /// Number of inputs applied since the last reset.
    pub fn frame(&self) -> usize {
        self.journal.len()
    }

    pub fn state(&self) -> &G::State {
        &self.state
    }

    pub fn journal(&self) -> &[G::Input] {
        &self.journal
    }

    /// Effects produced since the last drain, oldest first.
    pub fn pending_effects(&self) -> &[G::Effect] {
        &self.effects
    }

    pub fn drain_effects(&mut self) -> Vec<G::Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Throws away state, journal and undrained effects.
    pub fn reset(&mut self) {
        self.state = self.logic.initial_state();
        self.journal.clear();
        self.effects.clear();
    }
}

impl<G> HeadlessRunner<G>
where
    G: TickLogic,
    G::Input: Clone,
{
    pub fn step(&mut self, input: G::Input) -> usize {
        self.logic
            .step(&mut self.state, input.clone(), &mut self.effects);
        self.journal.push(input);
        self.journal.len()
    }

    pub fn run<I>(&mut self, inputs: I) -> usize
    where
        I: IntoIterator<Item = G::Input>,
    {
        let mut frame = self.frame();
        for input in inputs {
            frame = self.step(input);
        }
        frame
    }

    /// Drops the last `frames` inputs and rebuilds the state from the remaining journal.
    ///
    /// Effects produced while rebuilding are discarded: they already happened once.
    pub fn rewind(&mut self, frames: usize) -> usize {
        let keep = self.journal.len().saturating_sub(frames);
        let journal: Vec<G::Input> = self.journal.drain(..keep).collect();
        self.journal.clear();
        self.state = self.logic.initial_state();
        let mut scratch = Vec::new();
        for input in &journal {
            self.logic.step(&mut self.state, input.clone(), &mut scratch);
            scratch.clear();
        }
        self.journal = journal;
        self.effects.clear();
        self.journal.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum CounterInput {
        Add(i32),
        Reset,
    }

    struct Counter;

    impl TickLogic for Counter {
        type State = i32;
        type Input = CounterInput;
        type Effect = String;

        fn initial_state(&self) -> Self::State {
            0
        }

        fn step(&self, state: &mut Self::State, input: Self::Input, effects: &mut Vec<String>) {
            match input {
                CounterInput::Add(delta) => *state += delta,
                CounterInput::Reset => {
                    *state = 0;
                    effects.push("reset".to_string());
                }
            }
        }
    }

    #[test]
    fn runner_steps_and_collects_effects() {
        let mut runner = HeadlessRunner::new(Counter);
        runner.run([CounterInput::Add(3), CounterInput::Reset, CounterInput::Add(4)]);

        assert_eq!(runner.frame(), 3);
        assert_eq!(runner.state(), &4);
        assert_eq!(runner.pending_effects(), ["reset".to_string()]);

        assert_eq!(runner.drain_effects().len(), 1);
        assert!(runner.pending_effects().is_empty());
    }

    #[test]
    fn rewind_replays_journal_prefix_without_effects() {
        let mut runner = HeadlessRunner::new(Counter);
        runner.run([
            CounterInput::Add(1),
            CounterInput::Reset,
            CounterInput::Add(2),
            CounterInput::Add(5),
        ]);
        runner.drain_effects();

        assert_eq!(runner.rewind(1), 3);
        assert_eq!(runner.state(), &2);
        assert!(runner.pending_effects().is_empty());

        // Rewinding past the start leaves the initial state.
        assert_eq!(runner.rewind(10), 0);
        assert_eq!(runner.state(), &0);
    }

    #[test]
    fn reset_clears_journal() {
        let mut runner = HeadlessRunner::new(Counter);
        runner.step(CounterInput::Add(9));
        runner.reset();
        assert_eq!(runner.frame(), 0);
        assert_eq!(runner.state(), &0);
    }
}
