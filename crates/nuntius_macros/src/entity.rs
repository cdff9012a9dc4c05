use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Error, Fields, Ident, ItemStruct, LitStr, Result, parse_macro_input};

use crate::utils::{flag_index, reject_generics};

pub fn impl_entity(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut table: Option<LitStr> = None;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("table") {
            table = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported entity property, expected `table`"))
        }
    });
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as ItemStruct);

    match expand(table, input) {
        Ok(expanded) => expanded.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct EntityField {
    ident: Ident,
    name: String,
    ty: syn::Type,
}

fn expand(table: Option<LitStr>, mut input: ItemStruct) -> Result<proc_macro2::TokenStream> {
    reject_generics(&input.generics, "entities")?;

    let name = input.ident.clone();
    let table = table.unwrap_or_else(|| {
        LitStr::new(&name.to_string().to_case(Case::Snake), Span::call_site())
    });

    let Fields::Named(fields_named) = &mut input.fields else {
        return Err(Error::new_spanned(
            &input.ident,
            "entity attribute only works on structs with named fields",
        ));
    };

    // Skipped fields stay on the struct but take no part in materialization.
    let mut entity_fields = Vec::new();
    for field in fields_named.named.iter_mut() {
        let skip = flag_index(&field.attrs, "entity", "skip")?;
        if let Some(attr_idx) = skip {
            field.attrs.remove(attr_idx);
            continue;
        }

        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let name = ident.to_string();
        entity_fields.push(EntityField {
            name: name.trim_start_matches("r#").to_string(),
            ident,
            ty: field.ty.clone(),
        });
    }

    let field_name_consts = entity_fields.iter().map(|field| {
        let const_name = Ident::new(&field.name.to_case(Case::UpperSnake), Span::call_site());
        let field_name = &field.name;

        quote! {
            pub const #const_name: &'static str = #field_name
        }
    });

    let field_datatype_kinds = entity_fields.iter().map(|field| {
        let field_name = &field.name;
        let ty = &field.ty;

        quote! {
            (#field_name, <#ty as nuntius::AsDatatypeKind>::as_datatype_kind())
        }
    });

    let set_field_arms = entity_fields.iter().map(|field| {
        let field_name = &field.name;
        let ident = &field.ident;
        let ty = &field.ty;

        quote! {
            #field_name => self.#ident = <#ty as ::core::convert::TryFrom<nuntius::Datatype>>::try_from(value)?
        }
    });

    let field_into_datatypes = entity_fields.iter().map(|field| {
        let field_name = &field.name;
        let ident = &field.ident;

        quote! {
            (#field_name, ::core::convert::Into::<nuntius::Datatype>::into(::core::clone::Clone::clone(&self.#ident)))
        }
    });

    Ok(quote! {
        #[derive(Clone, Default)]
        #input

        impl #name {
            #(#field_name_consts;)*
        }

        impl nuntius::Entity for #name {
            const TABLE: &'static str = #table;

            fn fields() -> nuntius::FieldsDef {
                static FIELDS: std::sync::LazyLock<Box<[(&'static str, nuntius::DatatypeKind)]>> =
                    std::sync::LazyLock::new(|| Box::new([#(#field_datatype_kinds),*]));
                &FIELDS[..]
            }

            fn set_field(
                &mut self,
                field: &str,
                value: nuntius::Datatype,
            ) -> Result<(), nuntius::DatatypeConversionError> {
                match field {
                    #(#set_field_arms,)*
                    _ => {}
                }
                Ok(())
            }

            fn to_datatypes(&self) -> Vec<(&'static str, nuntius::Datatype)> {
                vec![#(#field_into_datatypes),*]
            }
        }
    })
}
