//! ClickHouse backend over the HTTP interface.
//!
//! Every statement is one POST. Inserts carry the statement in the `query`
//! parameter and `TabSeparated` rows in the body; DDL and selects carry the
//! statement as the body. Connections are pooled by the shared client.

use super::{tsv, Backend};
use crate::core::config::ClickHouseConfig;
use crate::core::{Fingerprint, GatewayError, LabelDescriptorRow, Result, SampleRow};
use std::time::Duration;
use tracing::{debug, info};

const INSERT_SAMPLES: &str =
    "INSERT INTO samples(fingerprint, timestamp_ms, value, string) FORMAT TabSeparated";
const INSERT_TIME_SERIES: &str =
    "INSERT INTO time_series(date, fingerprint, labels) FORMAT TabSeparated";

fn create_database_sql(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", database)
}

fn create_time_series_sql(database: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}.time_series \
         (date Date, fingerprint UInt64, labels String) \
         ENGINE = ReplacingMergeTree PARTITION BY date ORDER BY fingerprint",
        database
    )
}

fn create_samples_sql(database: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}.samples \
         (fingerprint UInt64, timestamp_ms Int64, value Float64, string String) \
         ENGINE = MergeTree PARTITION BY toDate(timestamp_ms / 1000) \
         ORDER BY (fingerprint, timestamp_ms)",
        database
    )
}

fn select_samples_sql(fingerprint: Fingerprint) -> String {
    format!(
        "SELECT fingerprint, timestamp_ms, value, string FROM samples \
         WHERE fingerprint = {} ORDER BY fingerprint, timestamp_ms FORMAT TabSeparated",
        fingerprint
    )
}

pub struct ClickHouseBackend {
    client: reqwest::Client,
    url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
}

impl ClickHouseBackend {
    pub fn new(config: &ClickHouseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.timeout,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Runs one statement. With `data`, the statement travels in the
    /// `query` parameter and `data` is the body. `scoped` selects the
    /// configured database for unqualified table names.
    async fn execute(&self, statement: &str, data: Option<String>, scoped: bool) -> Result<String> {
        let mut params: Vec<(&str, &str)> = Vec::with_capacity(2);
        if scoped {
            params.push(("database", self.database.as_str()));
        }
        let body = match data {
            Some(data) => {
                params.push(("query", statement));
                data
            },
            None => statement.to_string(),
        };

        let mut request = self.client.post(&self.url).query(&params).body(body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(GatewayError::backend(status.as_u16(), text.trim()));
        }
        Ok(text)
    }

    fn transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if err.is_connect() {
            GatewayError::Unreachable(format!("{}: {}", self.url, err))
        } else {
            GatewayError::Http(err)
        }
    }
}

#[async_trait::async_trait]
impl Backend for ClickHouseBackend {
    async fn bootstrap(&self) -> Result<()> {
        let statements = [
            create_database_sql(&self.database),
            create_time_series_sql(&self.database),
            create_samples_sql(&self.database),
        ];
        for statement in &statements {
            debug!(statement = %statement, "Running bootstrap DDL");
            self.execute(statement, None, false).await?;
        }
        info!(database = %self.database, url = %self.url, "ClickHouse tables ready");
        Ok(())
    }

    async fn insert_samples(&self, rows: &[SampleRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.execute(INSERT_SAMPLES, Some(tsv::encode_samples(rows)), true)
            .await?;
        Ok(())
    }

    async fn insert_label_descriptors(&self, rows: &[LabelDescriptorRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.execute(
            INSERT_TIME_SERIES,
            Some(tsv::encode_label_descriptors(rows)),
            true,
        )
        .await?;
        Ok(())
    }

    async fn select_samples(&self, fingerprint: Fingerprint) -> Result<Vec<SampleRow>> {
        let body = self
            .execute(&select_samples_sql(fingerprint), None, true)
            .await?;
        tsv::decode_samples(&body)
    }

    fn name(&self) -> &'static str {
        "clickhouse"
    }
}
