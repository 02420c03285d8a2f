//! User interaction seam: remote login prompts and the device-code notice.

// std
use std::{
	io::{self, BufRead, Write},
	time::Duration,
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	provision::{ProvisionTarget, RemoteLogin},
};

/// Instructions the user needs to finish a device-code sign-in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCodeNotice {
	/// Page the user opens in a browser.
	pub verification_uri: String,
	/// Code the user enters on that page.
	pub user_code: String,
	/// Provider-supplied, human-readable instructions.
	pub message: Option<String>,
	/// Lifetime of the code.
	pub expires_in: Duration,
}
impl Display for DeviceCodeNotice {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.message {
			Some(message) => f.write_str(message),
			None => write!(
				f,
				"To sign in, open {} and enter the code {}.",
				self.verification_uri, self.user_code
			),
		}
	}
}

/// Interactive prompts. Tests substitute scripted implementations.
pub trait Prompter: Send + Sync {
	/// Asks for the username and password of the remote provisioning host.
	fn remote_login(&self, target: &ProvisionTarget) -> io::Result<RemoteLogin>;

	/// Shows the device-code instructions.
	fn device_code(&self, notice: &DeviceCodeNotice);
}

/// Terminal prompter: username from stdin, password without echo.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompter;
impl Prompter for TerminalPrompter {
	fn remote_login(&self, target: &ProvisionTarget) -> io::Result<RemoteLogin> {
		let mut stderr = io::stderr().lock();

		write!(stderr, "Username for {}: ", target.host)?;
		stderr.flush()?;

		let mut username = String::new();

		io::stdin().lock().read_line(&mut username)?;

		let username = username.trim().to_owned();

		if username.is_empty() {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "username cannot be empty"));
		}

		let password = rpassword::prompt_password(format!("Password for {username}@{}: ", target.host))
			.map(TokenSecret::new)?;

		Ok(RemoteLogin { username, password })
	}

	fn device_code(&self, notice: &DeviceCodeNotice) {
		eprintln!("{notice}");
	}
}
