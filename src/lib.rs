//! Turnkey credential bootstrap: resolve an application access token from the environment, a
//! persisted config, an interactive device-code exchange, or a hybrid-encrypted bundle fetched
//! over SSH, then validate, refresh, and persist it.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod prompt;
pub mod provider;
pub mod provision;
pub mod resolver;

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		path::{Path, PathBuf},
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Error as ReqwestError, blocking::Client as ReqwestClient};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use url::Url;
	pub use zeroize::Zeroizing;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tracing_subscriber as _};
