//! MySQL backend over the `mysql` crate.
//!
//! One auto-committing connection. Statements without parameters go through
//! the text protocol (`SHOW`, `USE`, DDL); parameterised statements are
//! prepared and executed with positional parameters.

use super::{Database, ResultSet, SqlValue, Statement};
use crate::error::{CommuteError, Result};
use crate::parameters::ConnectionParameters;
use chrono::NaiveDate;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Params, Row, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Transport timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Read and write timeout, `None` to wait indefinitely
    pub io: Option<Duration>,
}

pub struct MySqlDatabase {
    conn: Conn,
    host: String,
}

impl MySqlDatabase {
    pub fn connect(parameters: &ConnectionParameters, timeouts: Timeouts) -> Result<Self> {
        info!(
            host = %parameters.host,
            port = parameters.port,
            user = %parameters.user,
            "database: connecting"
        );
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(parameters.host.clone()))
            .tcp_port(parameters.port)
            .user(Some(parameters.user.clone()))
            .pass(Some(parameters.pass.clone()))
            .tcp_connect_timeout(Some(timeouts.connect))
            .read_timeout(timeouts.io)
            .write_timeout(timeouts.io);

        let conn = Conn::new(opts)
            .map_err(|e| CommuteError::connection(&parameters.host, e.to_string()))?;
        info!(host = %parameters.host, "database: connected");

        Ok(Self {
            conn,
            host: parameters.host.clone(),
        })
    }
}

impl std::fmt::Debug for MySqlDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDatabase")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Database for MySqlDatabase {
    fn execute(&mut self, statement: &Statement) -> Result<ResultSet> {
        let rendered = statement.render();
        debug!(sql = %rendered.sql, params = rendered.params.len(), "mysql: execute");
        let failed = |e: mysql::Error| CommuteError::database(statement.kind(), e.to_string());

        let rows: Vec<Row> = if rendered.params.is_empty() {
            self.conn.query(rendered.sql.as_str()).map_err(failed)?
        } else {
            let params = Params::Positional(rendered.params.into_iter().map(to_value).collect());
            self.conn
                .exec(rendered.sql.as_str(), params)
                .map_err(failed)?
        };

        let columns = rows
            .first()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .map(|column| column.name_str().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        let values = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|index| row.as_ref(index).map(from_value).unwrap_or(SqlValue::Null))
                    .collect()
            })
            .collect();

        Ok(ResultSet {
            columns,
            rows: values,
            affected_rows: self.conn.affected_rows(),
        })
    }
}

fn to_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Int(v) => Value::Int(v),
        SqlValue::Float(v) => Value::Double(v),
        SqlValue::Text(text) => Value::Bytes(text.into_bytes()),
        SqlValue::DateTime(dt) => {
            use chrono::{Datelike, Timelike};
            Value::Date(
                dt.year() as u16,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond() / 1_000,
            )
        }
    }
}

fn from_value(value: &Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        Value::Int(v) => SqlValue::Int(*v),
        Value::UInt(v) => i64::try_from(*v)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Float(*v as f64)),
        Value::Float(v) => SqlValue::Float(f64::from(*v)),
        Value::Double(v) => SqlValue::Float(*v),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                })
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Null)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => SqlValue::Text(format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            if *negative { "-" } else { "" },
            u32::from(*hours) + days * 24,
            minutes,
            seconds,
            micros
        )),
    }
}
