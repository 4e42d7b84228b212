//! Notification hooks fired by the driver.

use crate::{Condition, particle::{FromParticles, Particle}};

use super::ParserState;

/// Receive state, particle and error notifications from a driver.
///
/// Hooks fire synchronously on the calling thread, so implementations should
/// return promptly. The driver never waits on a response.
///
/// The default implementation of each method ignores the notification.
#[allow(unused_variables)]
pub trait Callbacks {
    /// The state changed. Persist it to resume from here later.
    fn on_state(&mut self, state: &ParserState) {}
    /// A call to [`Driver::get_records`](super::Driver::get_records) produced
    /// particles.
    fn on_publish(&mut self, particles: &[Particle]) {}
    /// A recoverable condition occurred.
    fn on_error(&mut self, condition: &Condition) {}
}

impl Callbacks for () {}

impl<C: Callbacks + ?Sized> Callbacks for &mut C {
    fn on_state(&mut self, state: &ParserState) {
        (**self).on_state(state);
    }

    fn on_publish(&mut self, particles: &[Particle]) {
        (**self).on_publish(particles);
    }

    fn on_error(&mut self, condition: &Condition) {
        (**self).on_error(condition);
    }
}

/// Callbacks publishing every particle into a typed receiver, keeping the
/// latest state and all conditions.
#[derive(Debug, Default)]
pub struct Collect<T> {
    pub records: T,
    pub state: Option<ParserState>,
    pub conditions: Vec<Condition>,
}

impl<T: FromParticles> Collect<T> {
    pub fn new(records: T) -> Self {
        Self {
            records,
            state: None,
            conditions: Vec::new(),
        }
    }
}

impl<T: FromParticles> Callbacks for Collect<T> {
    fn on_state(&mut self, state: &ParserState) {
        self.state = Some(state.clone());
    }

    fn on_publish(&mut self, particles: &[Particle]) {
        for p in particles {
            p.publish(&mut self.records);
        }
    }

    fn on_error(&mut self, condition: &Condition) {
        self.conditions.push(condition.clone());
    }
}
