//! Macros for reducing boilerplate when defining records
//!
//! [`impl_record!`](crate::impl_record) declares a record struct with the
//! common lifecycle fields, its column enum and the `Entity`/`Column`/`Record`
//! implementations, so every record type has a constant column table instead
//! of looking fields up by name at runtime.

/// Declare a record type together with its column table
///
/// Injects the fields `id`, `status`, `updated_by`, `created_at` and
/// `updated_at`; the listed fields follow. Each listed field names its column
/// variant explicitly.
///
/// # Example
///
/// ```rust,ignore
/// impl_record!(
///     /// A hardware model
///     Model, ModelColumn, "Model", "models",
///     unique: [[Name]],
///     {
///         #[validate(length(min = 1, max = 255))]
///         Name => name: String,
///         VendorName => vendor_name: String,
///     }
/// );
///
/// assert_eq!(ModelColumn::VendorName.name(), "vendor_name");
/// ```
#[macro_export]
macro_rules! impl_record {
    (
        $(#[$struct_meta:meta])*
        $type:ident, $column:ident, $entity_name:literal, $table:literal,
        unique: [ $( [ $( $key:ident ),+ $(,)? ] ),* $(,)? ],
        {
            $(
                $(#[$field_meta:meta])*
                $variant:ident => $field:ident : $field_type:ty
            ),* $(,)?
        }
    ) => {
        $(#[$struct_meta])*
        #[derive(Debug, Clone, PartialEq, ::serde::Serialize, ::serde::Deserialize, ::validator::Validate)]
        pub struct $type {
            /// Assigned by the store on insert
            #[serde(default)]
            pub id: ::uuid::Uuid,

            #[serde(default)]
            pub status: $crate::core::entity::Status,

            /// Actor of the last write
            #[serde(default)]
            pub updated_by: String,

            #[serde(default)]
            pub created_at: ::chrono::DateTime<::chrono::Utc>,

            #[serde(default)]
            pub updated_at: ::chrono::DateTime<::chrono::Utc>,

            $(
                $(#[$field_meta])*
                pub $field: $field_type,
            )*
        }

        /// Columns of the record's table
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $column {
            Id,
            Status,
            UpdatedBy,
            CreatedAt,
            UpdatedAt,
            $( $variant, )*
        }

        impl $crate::core::entity::Column for $column {
            const ALL: &'static [Self] = &[
                $column::Id,
                $column::Status,
                $column::UpdatedBy,
                $column::CreatedAt,
                $column::UpdatedAt,
                $( $column::$variant, )*
            ];
            const ID: Self = $column::Id;
            const STATUS: Self = $column::Status;
            const UPDATED_BY: Self = $column::UpdatedBy;
            const UPDATED_AT: Self = $column::UpdatedAt;
            const CREATED_AT: Self = $column::CreatedAt;

            fn name(self) -> &'static str {
                match self {
                    $column::Id => "id",
                    $column::Status => "status",
                    $column::UpdatedBy => "updated_by",
                    $column::CreatedAt => "created_at",
                    $column::UpdatedAt => "updated_at",
                    $( $column::$variant => stringify!($field), )*
                }
            }

            fn kind(self) -> $crate::core::field::FieldKind {
                use $crate::core::field::{FieldKind, FieldType};
                match self {
                    $column::Id => FieldKind::Uuid,
                    $column::Status => FieldKind::Status,
                    $column::UpdatedBy => FieldKind::Text,
                    $column::CreatedAt | $column::UpdatedAt => FieldKind::Timestamp,
                    $( $column::$variant => <$field_type as FieldType>::KIND, )*
                }
            }
        }

        impl $crate::core::entity::Entity for $type {
            const ENTITY_NAME: &'static str = $entity_name;

            fn id(&self) -> ::uuid::Uuid {
                self.id
            }

            fn status(&self) -> $crate::core::entity::Status {
                self.status
            }

            fn updated_by(&self) -> &str {
                &self.updated_by
            }

            fn created_at(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.created_at
            }

            fn updated_at(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.updated_at
            }
        }

        impl $crate::core::entity::Record for $type {
            type Column = $column;

            const TABLE: &'static str = $table;

            const UNIQUE: &'static [&'static [$column]] = &[
                $( &[ $( $column::$key ),+ ], )*
            ];

            fn value_of(&self, column: $column) -> $crate::core::field::FieldValue {
                use $crate::core::field::FieldType;
                match column {
                    $column::Id => self.id.to_field(),
                    $column::Status => self.status.to_field(),
                    $column::UpdatedBy => self.updated_by.to_field(),
                    $column::CreatedAt => self.created_at.to_field(),
                    $column::UpdatedAt => self.updated_at.to_field(),
                    $( $column::$variant => self.$field.to_field(), )*
                }
            }

            fn set_value(
                &mut self,
                column: $column,
                value: $crate::core::field::FieldValue,
            ) -> bool {
                match column {
                    $column::Id => $crate::impl_record!(@assign self.id, ::uuid::Uuid, value),
                    $column::Status => {
                        $crate::impl_record!(@assign self.status, $crate::core::entity::Status, value)
                    }
                    $column::UpdatedBy => $crate::impl_record!(@assign self.updated_by, String, value),
                    $column::CreatedAt => {
                        $crate::impl_record!(@assign self.created_at, ::chrono::DateTime<::chrono::Utc>, value)
                    }
                    $column::UpdatedAt => {
                        $crate::impl_record!(@assign self.updated_at, ::chrono::DateTime<::chrono::Utc>, value)
                    }
                    $( $column::$variant => $crate::impl_record!(@assign self.$field, $field_type, value), )*
                }
            }
        }
    };

    (@assign $target:expr, $field_type:ty, $value:expr) => {
        match <$field_type as $crate::core::field::FieldType>::from_field($value) {
            Some(converted) => {
                $target = converted;
                true
            }
            None => false,
        }
    };
}
