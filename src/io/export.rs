use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::CalculatorService;
use crate::domain::{Record, User, format_cents};

/// A user's account and visible records, as written by the JSON export
#[derive(Debug, Clone, Serialize)]
pub struct RecordsSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub user: User,
    pub records: Vec<Record>,
}

/// Exporter for writing a user's records to various formats
pub struct Exporter<'a> {
    service: &'a CalculatorService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a CalculatorService) -> Self {
        Self { service }
    }

    /// Export a user's records to CSV format
    pub async fn export_records_csv<W: Write>(&self, username: &str, writer: W) -> Result<usize> {
        let user = self.service.find_user(username).await?;
        let records = self.service.all_records(user.id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "date",
            "operation",
            "amount",
            "user_balance",
            "result",
        ])?;

        for record in &records {
            csv_writer.write_record([
                record.id.to_string(),
                record.sequence.to_string(),
                record.date.to_rfc3339(),
                record.operation_type.to_string(),
                format_cents(record.amount_cents),
                format_cents(record.user_balance_cents),
                record.result.clone(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(records.len())
    }

    /// Export a user's account and records as a JSON snapshot
    pub async fn export_records_json<W: Write>(
        &self,
        username: &str,
        mut writer: W,
    ) -> Result<RecordsSnapshot> {
        let user = self.service.find_user(username).await?;
        let records = self.service.all_records(user.id).await?;

        let snapshot = RecordsSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            user,
            records,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
