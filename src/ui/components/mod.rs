mod command_input;
mod confirm;
mod dialog;
mod form;
mod input;
mod key_result;
mod search_input;

pub use command_input::{CommandEvent, CommandInput};
pub use dialog::{Dialog, DialogOutcome};
pub use form::{Form, FormEvent, FormValues};
pub use key_result::KeyResult;
pub use search_input::{SearchEvent, SearchInput};
