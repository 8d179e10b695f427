//! Parameter binding for PostgreSQL queries.

use crate::models::QueryParam;
use sqlx::Postgres;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::types::Json;
use sqlx::{Encode, Type};

/// A NULL whose type the server infers from context.
///
/// Binding `None::<String>` declares the parameter as `text`, which the
/// server refuses to assign to an integer or date column.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(UntypedNull),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untyped_null_declares_unspecified_oid() {
        assert_eq!(
            <UntypedNull as Type<Postgres>>::type_info(),
            PgTypeInfo::with_oid(Oid(0))
        );
    }

    #[test]
    fn test_untyped_null_encodes_as_null() {
        let mut buf = PgArgumentBuffer::default();
        let is_null = UntypedNull.encode_by_ref(&mut buf).unwrap();
        assert!(is_null.is_null());
    }
}
