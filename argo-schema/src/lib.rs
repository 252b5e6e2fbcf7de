#![forbid(unsafe_code)]

pub mod macros;

use arrow::datatypes::Schema;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table {table} is missing column {column}")]
    MissingColumn { table: String, column: String },
    #[error("table {table} column {column}: expected {expected}, loaded as {actual}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
}

/// One entry of the telemetry catalog.
#[derive(Clone, Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub schema: Schema,
}

impl TableDef {
    /// Prompt line, e.g. `Table "argo_profiles": Columns -> "N_MEASUREMENT", "PRES".`
    pub fn describe(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Table \"{}\": Columns -> {}.", self.name, cols)
    }

    /// Verify a loaded table exposes the declared columns.
    pub fn check(&self, loaded: &Schema) -> Result<(), SchemaError> {
        macros::__check_declared_columns(self.name, &self.schema, loaded)
    }
}

/// Float telemetry tables as loaded by the ETL.
pub mod generated {
    use crate::define_tables;

    define_tables! {
        table ArgoTrajectory {
            name: "argo_trajectory",
            fields: {
                N_MEASUREMENT: Int64,
                LATITUDE: Float64,
                LONGITUDE: Float64
            }
        },

        table ArgoProfiles {
            name: "argo_profiles",
            fields: {
                N_MEASUREMENT: Int64,
                PRES: Float64,
                TEMP: Float64,
                PSAL: Float64
            }
        },

        table ArgoTechnical {
            name: "argo_technical",
            fields: {
                TECHNICAL_PARAMETER_NAME: Utf8,
                TECHNICAL_PARAMETER_VALUE: Utf8,
                CYCLE_NUMBER: Int64
            }
        },

        table ArgoMetadata {
            name: "argo_metadata",
            fields: {
                PLATFORM_NUMBER: Utf8,
                PROJECT_NAME: Utf8,
                PI_NAME: Utf8,
                LAUNCH_DATE: Utf8,
                FLOAT_SERIAL_NO: Utf8,
                SENSOR_MODEL: Utf8,
                FIRMWARE_VERSION: Utf8
            }
        },
    }
}

pub use generated::*;

/// Schema text embedded in SQL generation prompts, one line per table.
pub fn schema_description() -> String {
    catalog()
        .iter()
        .map(TableDef::describe)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Catalog entry by table name.
pub fn table(name: &str) -> Option<TableDef> {
    catalog().into_iter().find(|t| t.name == name)
}
