//! Resilient request execution for Parlance.
//!
//! Requests flow through one [`ResilientExecutor`]: it waits on a shared
//! cooldown, sends through an [`HttpTransport`], and retries transient
//! failures with jittered exponential backoff. Failures that survive the
//! retry budget are turned into user-displayable errors by [`error_format`].

pub mod backoff;
pub mod cooldown;
pub mod error_format;
pub mod executor;
pub mod openai_compat;
pub mod transport;

pub use cooldown::{CooldownGate, CooldownRegistry};
pub use executor::{ExecuteError, ExecuteOptions, Execution, ResilientExecutor, RetryPolicy};
pub use openai_compat::OpenAiCompatProvider;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ScriptedTransport};
