use crate::dispatch::CommandResult;
use crate::poll::PollResult;

/// Everything background tasks hand back to the controller
#[derive(Debug, Clone)]
pub enum Update {
    Poll(PollResult),
    Command(CommandResult),
}
