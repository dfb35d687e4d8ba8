//! Client for an asynchronous advertising report API.
//!
//! Reports are requested with a [`ReportDefinition`], polled until the
//! upstream finishes generating them, and returned as tab-separated text that
//! [`parse_report`] turns into rows.

mod client;
mod errors;
pub mod parse;
mod report;
mod sleep;

pub use self::client::{Client, PollPolicy};
pub use self::errors::Error;
pub use self::parse::{parse_report, ReportRow, ReportRows, NO_DATA};
pub use self::report::{Filter, FilterOperator, ProcessingMode, ReportDefinition};
pub use self::sleep::{Sleeper, TokioSleeper};
