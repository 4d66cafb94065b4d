//! Mapping of driver errors into [`tenantload_core::Error`].

use tenantload_core::Error;

pub(crate) fn connection(tenant: &str, err: &sqlx::Error) -> Error {
    Error::Connection { tenant: tenant.to_string(), message: describe(err) }
}

pub(crate) fn query(statement: &str, err: &sqlx::Error) -> Error {
    Error::Query { statement: statement.to_string(), message: describe(err) }
}

pub(crate) fn catalog(what: &str, err: &sqlx::Error) -> Error {
    Error::DirectoryUnavailable { message: format!("{what}: {}", describe(err)) }
}

pub(crate) fn admin(statement: &str, err: &sqlx::Error) -> Error {
    Error::provisioning(format!("{statement}: {}", describe(err)))
}

/// Server errors carry the SQLSTATE, which is what users grep for.
fn describe(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => format!("{} (SQLSTATE {code})", db.message()),
            None => db.message().to_string(),
        },
        other => other.to_string(),
    }
}

/// Database and table names are interpolated into DDL, so only plain
/// lower-case identifiers are accepted.
pub(crate) fn identifier(name: &str) -> tenantload_core::Result<&str> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        && !name.as_bytes()[0].is_ascii_digit();
    if valid {
        Ok(name)
    } else {
        Err(Error::configuration(format!("'{name}' is not a valid identifier")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(identifier("md_scalability_db_12").is_ok());
        assert!(identifier("").is_err());
        assert!(identifier("1db").is_err());
        assert!(identifier("db; DROP DATABASE x").is_err());
        assert!(identifier("Upper").is_err());
        assert!(identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_driver_errors_keep_their_category() {
        let err = connection("md_scalability_db_1", &sqlx::Error::PoolTimedOut);
        assert!(matches!(err, Error::Connection { ref tenant, .. } if tenant == "md_scalability_db_1"));
        assert!(matches!(query("SELECT 1", &sqlx::Error::RowNotFound), Error::Query { .. }));
        assert!(matches!(catalog("counting", &sqlx::Error::PoolClosed), Error::DirectoryUnavailable { .. }));
        assert!(matches!(admin("DROP DATABASE x", &sqlx::Error::PoolClosed), Error::Provisioning { .. }));
    }
}
