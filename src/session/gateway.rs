use std::error::Error;

use super::Session;

/// The plug-in contract for external libraries.
///
/// `initialize` installs productions and handlers into the session's
/// grammar repository and may register runtime services;
/// `uninitialize` reverses those changes by name, restoring the
/// repository to its pre-init state. Loading happens before any source
/// input is consumed.
pub trait LibraryGateway {
    fn initialize(&mut self, session: &Session) -> Result<(), Box<dyn Error>>;
    fn uninitialize(&mut self, session: &Session) -> Result<(), Box<dyn Error>>;
}
