//! Binding of `QueryParam` values onto sqlx queries.
//!
//! One generic binder serves all three engines; the bounds list every Rust
//! type a `QueryParam` variant is encoded as.

use crate::models::QueryParam;
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};

type BoundQuery<'q, DB> = Query<'q, DB, <DB as Database>::Arguments<'q>>;

/// Bind every parameter in order.
pub(crate) fn bind_params<'q, DB>(
    mut query: BoundQuery<'q, DB>,
    params: &'q [QueryParam],
) -> BoundQuery<'q, DB>
where
    DB: Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    &'q [u8]: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            // Untyped NULL; every engine accepts a NULL text for any column
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}
