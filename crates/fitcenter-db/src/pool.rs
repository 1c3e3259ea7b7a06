use std::time::Duration;

use fitcenter_config::DbConfig;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Connection target: the URL when one is configured, else the individual
/// `DB_*` fields passed to the driver unescaped
pub fn connect_options(db_config: &DbConfig) -> Result<PgConnectOptions, sqlx::Error> {
    match &db_config.url {
        Some(url) => url.parse(),
        None => Ok(PgConnectOptions::new()
            .host(&db_config.host)
            .port(db_config.port)
            .username(&db_config.user)
            .password(&db_config.password)
            .database(&db_config.database)
            .ssl_mode(db_config.ssl_mode.parse()?)),
    }
}

/// Create a PostgreSQL connection pool bounded by `db_config`
pub async fn create_pool(db_config: &DbConfig) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(db_config.idle_timeout_secs)))
        .max_lifetime(Some(Duration::from_secs(db_config.max_lifetime_secs)))
        .test_before_acquire(true)
        .connect_with(connect_options(db_config)?)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitcenter_config::AuthConfig;

    fn db_config(pairs: &[(&str, &str)]) -> DbConfig {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .chain([("JWT_SECRET".to_string(), "s3cret".to_string())])
            .collect();
        AuthConfig::from_lookup(move |key| {
            pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap()
        .db
    }

    #[test]
    fn test_reserved_characters_in_credentials_do_not_move_the_target() {
        let options = connect_options(&db_config(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6432"),
            ("DB_USER", "fit@center"),
            ("DB_PASSWORD", "p@ss/w:rd?#"),
            ("DB_NAME", "auth"),
        ]))
        .unwrap();

        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_username(), "fit@center");
        assert_eq!(options.get_database(), Some("auth"));
    }

    #[test]
    fn test_url_takes_precedence() {
        let options = connect_options(&db_config(&[
            ("DATABASE_URL", "postgres://a:b@db:5433/auth"),
            ("DB_HOST", "ignored"),
        ]))
        .unwrap();

        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "a");
        assert_eq!(options.get_database(), Some("auth"));
    }

    #[test]
    fn test_unknown_ssl_mode_is_rejected() {
        assert!(connect_options(&db_config(&[("DB_SSLMODE", "sometimes")])).is_err());
    }
}
