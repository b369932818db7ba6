use crate::commands::session::{execute, Failure};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    execute("migrate", |_session| async {
        Ok::<_, Failure>(CommandResult::success("migrate", "applied pending migrations"))
    })
}
