use proc_macro::TokenStream;

mod entity;
use entity::impl_entity;

mod utils;

/// Implement `nuntius::Entity` for a struct with named fields.
///
/// ```ignore
/// #[entity(table = "groups_group")]
/// pub struct Group {
///     pub id: i64,
///     pub name: String,
///     pub description: Option<String>,
///     #[entity(skip)]
///     pub cached_members: Vec<i64>,
/// }
/// ```
///
/// The table defaults to the snake-cased struct name. Every field that is not
/// skipped must implement `AsDatatypeKind`, `TryFrom<Datatype>` and
/// `Into<Datatype>`. The struct also gets `Clone` and `Default` derives and a
/// `&'static str` constant per field (`Group::IS_ACTIVE`).
#[proc_macro_attribute]
pub fn entity(args: TokenStream, item: TokenStream) -> TokenStream {
    impl_entity(args, item)
}
