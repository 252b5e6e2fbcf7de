//! Macro that turns the table declarations into Arrow schemas and catalog entries.

use ::arrow::datatypes::{DataType, Schema};

use crate::SchemaError;

fn is_numeric(ty: &DataType) -> bool {
    ty.is_integer() || ty.is_floating() || matches!(ty, DataType::Decimal128(_, _) | DataType::Decimal256(_, _))
}

fn is_textual(ty: &DataType) -> bool {
    matches!(ty, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View)
}

/// Runtime check of a loaded table against its declaration.
///
/// Every declared column must be present. Declared numeric columns must load as some
/// numeric type; declared text columns accept anything, since CSV inference turns
/// digit-only identifiers into integers.
pub fn __check_declared_columns(
    table_name: &str,
    declared: &Schema,
    loaded: &Schema,
) -> Result<(), SchemaError> {
    for field in declared.fields() {
        let actual = loaded
            .field_with_name(field.name())
            .map_err(|_| SchemaError::MissingColumn {
                table: table_name.to_string(),
                column: field.name().clone(),
            })?;
        let expected = field.data_type();
        let ok = if is_numeric(expected) {
            is_numeric(actual.data_type())
        } else if is_textual(expected) {
            true
        } else {
            expected == actual.data_type()
        };
        if !ok {
            return Err(SchemaError::TypeMismatch {
                table: table_name.to_string(),
                column: field.name().clone(),
                expected: expected.to_string(),
                actual: actual.data_type().to_string(),
            });
        }
    }
    Ok(())
}

/// Map DSL token -> Arrow DataType.
#[macro_export]
macro_rules! __ty_to_arrow {
    ( Utf8 ) => { ::arrow::datatypes::DataType::Utf8 };
    ( Int64 )  => { ::arrow::datatypes::DataType::Int64 };
    ( Int32 )  => { ::arrow::datatypes::DataType::Int32 };
    ( Float64 ) => { ::arrow::datatypes::DataType::Float64 };
    ( Float32 ) => { ::arrow::datatypes::DataType::Float32 };
    ( Boolean ) => { ::arrow::datatypes::DataType::Boolean };
}

/// Declarative table definitions. Generates one marker type per table plus `catalog()`.
#[macro_export]
macro_rules! define_tables {
    (
        $(
            table $Name:ident {
                name: $table:literal,
                fields: {
                    $( $fname:ident : $fty:ident ),* $(,)?
                }
            }
        ),* $(,)?
    ) => {
        $(
            #[doc = concat!("Declaration of the `", $table, "` table.")]
            #[derive(Clone, Copy, Debug)]
            pub struct $Name;

            impl $Name {
                pub const NAME: &'static str = $table;
                pub const COLUMNS: &'static [&'static str] = &[$( stringify!($fname) ),*];

                /// Arrow schema of the declared columns.
                pub fn schema() -> ::arrow::datatypes::Schema {
                    ::arrow::datatypes::Schema::new(vec![
                        $(
                            ::arrow::datatypes::Field::new(
                                stringify!($fname),
                                $crate::__ty_to_arrow!($fty),
                                true,
                            ),
                        )*
                    ])
                }

                pub fn def() -> $crate::TableDef {
                    $crate::TableDef {
                        name: Self::NAME,
                        columns: Self::COLUMNS,
                        schema: Self::schema(),
                    }
                }
            }
        )*

        /// All declared tables, in declaration order.
        pub fn catalog() -> Vec<$crate::TableDef> {
            vec![$( $Name::def() ),*]
        }
    };
}
