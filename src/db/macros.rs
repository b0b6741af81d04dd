//! Database dispatch macros for reducing code duplication.
//!
//! The sqlx connection types are distinct per engine, so every operation on a
//! [`NativeConnection`](crate::db::connection::NativeConnection) has to be
//! written once per variant. The macro keeps those match statements short.

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `NativeConnection` variants, reducing the
/// need to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_conn_dispatch!(&mut self.native, {
///     MySql(c) => Executor::execute(&mut *c, "COMMIT").await,
///     Postgres(c) => Executor::execute(&mut *c, "COMMIT").await,
///     SQLite(c) => Executor::execute(&mut *c, "COMMIT").await,
/// });
/// ```
#[macro_export]
macro_rules! impl_conn_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::NativeConnection::$variant($c) => $body,
            )+
        }
    };
}
