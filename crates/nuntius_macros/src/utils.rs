use syn::{Attribute, Error, Result};

/// Position of the `#[ident(flag)]` attribute in `attrs`, if any.
///
/// Any other flag inside an `#[ident(..)]` attribute is an error, so typos
/// do not silently fall through.
pub fn flag_index(attrs: &[Attribute], ident: &str, flag: &str) -> Result<Option<usize>> {
    let mut found = None;

    for (attr_idx, attr) in attrs.iter().enumerate() {
        if !attr.path().is_ident(ident) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(flag) {
                found = Some(attr_idx);
                Ok(())
            } else {
                Err(meta.error(format!("unsupported `{ident}` field property")))
            }
        })?;
    }

    Ok(found)
}

pub fn reject_generics(generics: &syn::Generics, what: &str) -> Result<()> {
    if generics.params.is_empty() && generics.where_clause.is_none() {
        return Ok(());
    }

    Err(Error::new_spanned(
        generics,
        format!("{what} cannot be generic"),
    ))
}
