//! Cancellable one-shot and repeating timers keyed by arena slot + generation.
//!
//! Handles stay valid only as long as their slot generation matches, so a stale
//! `TimerId` held across a `clear` can never cancel (or observe) a newer timer that
//! reused the slot. Timers never fire on their own: the owner polls `pop_due` with the
//! current clock and handles one expiry at a time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Scheduled<K> {
    due: Duration,
    period: Option<Duration>,
    // Tie-breaker so timers due at the same instant fire in scheduling order.
    seq: u64,
    kind: K,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Slot<K> {
    generation: u32,
    timer: Option<Scheduled<K>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerQueue<K> {
    slots: Vec<Slot<K>>,
    next_seq: u64,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            next_seq: 0,
        }
    }
}

/// A timer that reached its due time.
#[derive(Debug, Clone, PartialEq)]
pub struct Expired<K> {
    pub id: TimerId,
    pub due: Duration,
    pub kind: K,
}

impl<K: Clone> TimerQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot timer firing at `now + delay`.
    pub fn schedule(&mut self, now: Duration, delay: Duration, kind: K) -> TimerId {
        self.insert(now.saturating_add(delay), None, kind)
    }

    /// Repeating timer, first firing at `now + period`.
    pub fn schedule_repeating(&mut self, now: Duration, period: Duration, kind: K) -> TimerId {
        // A zero period would fire forever within one `pop_due` drain.
        let period = period.max(Duration::from_millis(1));
        self.insert(now.saturating_add(period), Some(period), kind)
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.slot_mut(id) {
            Some(slot) if slot.timer.is_some() => {
                slot.timer = None;
                slot.generation = slot.generation.wrapping_add(1);
                true
            }
            _ => false,
        }
    }

    /// Cancels every pending timer and invalidates every handle issued so far.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.timer.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.timer.is_some())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.timer.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.slots
            .iter()
            .filter_map(|slot| slot.timer.as_ref().map(|t| t.due))
            .min()
    }

    /// Removes and returns the earliest timer due at or before `now`.
    ///
    /// Repeating timers are re-armed one period after their previous due time and keep
    /// their id, so a caller may still cancel them from inside the handler.
    pub fn pop_due(&mut self, now: Duration) -> Option<Expired<K>> {
        let (index, _) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.timer.as_ref().map(|t| (i, (t.due, t.seq))))
            .filter(|(_, (due, _))| *due <= now)
            .min_by_key(|(_, key)| *key)?;

        let next_seq = &mut self.next_seq;
        let slot = &mut self.slots[index];
        let id = TimerId {
            index: index as u32,
            generation: slot.generation,
        };
        let timer = slot.timer.as_mut()?;
        let due = timer.due;
        let kind = timer.kind.clone();
        let period = timer.period;

        match period {
            Some(period) => {
                timer.due = due.saturating_add(period);
                timer.seq = *next_seq;
                *next_seq += 1;
            }
            None => {
                slot.timer = None;
                slot.generation = slot.generation.wrapping_add(1);
            }
        }

        Some(Expired { id, due, kind })
    }

    fn insert(&mut self, due: Duration, period: Option<Duration>, kind: K) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let timer = Scheduled {
            due,
            period,
            seq,
            kind,
        };

        if let Some(index) = self.slots.iter().position(|slot| slot.timer.is_none()) {
            let slot = &mut self.slots[index];
            slot.timer = Some(timer);
            return TimerId {
                index: index as u32,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            timer: Some(timer),
        });
        TimerId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn slot_mut(&mut self, id: TimerId) -> Option<&mut Slot<K>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }
}
