//! Small helpers shared by the HTTP sources and the CLI.
//!
//! - **Base URL validation**: the API root must be HTTPS (plain HTTP only for
//!   loopback hosts, which keeps local mock servers usable)
//! - **Text**: price formatting and control-character stripping for terminal output
//!
//! # Examples
//!
//! ```
//! use homefeed::util::{format_price, validate_base_url};
//!
//! let base = validate_base_url("https://kurly.com").unwrap();
//! assert_eq!(base.as_str(), "https://kurly.com/");
//!
//! assert_eq!(format_price(6200), "6,200원");
//! ```

mod base_url;
mod text;

pub use base_url::{validate_base_url, BaseUrlError};
pub use text::{format_price, strip_control_chars};
