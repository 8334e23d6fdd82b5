use crate::error::StageError;
use crate::messages::Messages;

/// One unit of work with a declared step count.
///
/// `C` is the operation's context (document handle, saving state, ...). The
/// scheduler calls `setup` once per run before any step, then `perform` once
/// per tick; other stages' bookkeeping may happen between two calls.
pub trait Stage<C>: Send {
    /// Returns the number of steps. May reset stage-owned state but must not
    /// do the actual work.
    fn setup(&mut self, context: &mut C) -> Result<usize, StageError>;

    /// Executes step `step` (in `0..setup()`).
    fn perform(
        &mut self,
        step: usize,
        context: &mut C,
        messages: &mut Messages,
    ) -> Result<(), StageError>;

    /// Receives a configured user setting before `setup` is called.
    fn update_user_setting(&mut self, _name: &str, _values: &[String]) {}

    fn name(&self) -> &str;
}
