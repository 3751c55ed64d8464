//! # twofingers
//!
//! Data access and verification for black-box API tests.
//!
//! Two halves:
//!
//! - **Fixtures**: fluent chains that describe the entity a test needs and
//!   fetch a random matching row, never handing the same row to two tests
//!   of one run.
//! - **Assertions**: compare a decoded response with an expected template
//!   whose leaves are literal values or `CHECK_*` sentinels.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use twofingers::prelude::*;
//! use serde_json::json;
//!
//! let fixtures = Fixtures::new(DbGateway::connect("postgres://localhost/api_test")?);
//!
//! let review = fixtures
//!     .entity("review")
//!     .is("is_hidden", false)
//!     .join("comments", "id", "review_id")
//!     .get_random_entity()?;
//!
//! // ... call the API with review["id"] ...
//!
//! assert_response(
//!     &json!({ "code": 200, "result": { "id": review["id"], "text": "CHECK_STRING_NOT_EMPTY" } }),
//!     &body,
//! )?;
//! ```
//!
//! ## Sentinels
//!
//! | Token                    | Requirement on the actual value        |
//! |--------------------------|----------------------------------------|
//! | `CHECK_EXIST`            | key present                            |
//! | `CHECK_NOT_NULL`         | not null                               |
//! | `CHECK_POSITIVE`         | number > 0                             |
//! | `CHECK_NOT_NEGATIVE`     | number >= 0                            |
//! | `CHECK_NOT_ZERO`         | number != 0                            |
//! | `CHECK_STRING_NOT_EMPTY` | non-empty string                       |
//! | `CHECK_ARRAY_EMPTY`      | empty collection                       |
//! | `CHECK_ARRAY_NOT_EMPTY`  | non-empty collection                   |
//! | `CHECK_DATETIME_FORMAT`  | `YYYY-MM-DDTHH:MM:SS±HH:MM`            |
//! | `CHECK_DATE_FORMAT`      | `YYYY-MM-DD`                           |

pub mod assert;
pub mod config;
pub mod engine;
pub mod error;
pub mod generate;
pub mod query;
pub mod registry;
pub mod report;
pub mod state;
pub mod value;

pub use query::{EntityQuery, Fixtures};

pub mod prelude {
    pub use crate::assert::{Assertion, AssertionFailure, Check, ResponseContext, assert_response};
    pub use crate::config::Config;
    pub use crate::engine::{DbGateway, Gateway, Row};
    pub use crate::error::*;
    pub use crate::query::{EntityQuery, Fixtures};
    pub use crate::registry::UsedIds;
    pub use crate::state::Limit;
    pub use crate::value::{InValues, SqlValue, Subquery, ToSql};
}

/// Connect to the configured database and start a fixture run.
///
/// # Example
///
/// ```rust,ignore
/// let config = twofingers::config::Config::discover()?;
/// let fixtures = twofingers::connect(&config)?;
/// ```
pub fn connect(config: &config::Config) -> Result<Fixtures<engine::DbGateway>, error::DbError> {
    let url = config
        .db
        .database_url()
        .ok_or_else(|| error::DbError::Connection("no database configured ([db] url or host/name)".to_string()))?;

    let gateway = engine::DbGateway::connect_with(&url, config.db.max_connections, config.server.verbose)?;
    Ok(Fixtures::new(gateway).with_meta(config.meta.clone()))
}
