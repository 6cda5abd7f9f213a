//! Procedural macros for the docrepo project.
//!
//! This crate provides `#[derive(Entity)]`, which generates the `Entity` implementation
//! and its accessor table from field attributes.

#[allow(unused_extern_crates)]
extern crate self as docrepo_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, parse_macro_input, spanned::Spanned};

/// Derives `docrepo::entity::Entity` for a struct with named fields.
///
/// Field attributes:
///
/// - `#[entity(id)]` marks the identity field. Without it, a field named `id` is used.
///   Add `readonly` (`#[entity(id, readonly)]`) if the store must never generate ids.
/// - `#[entity(etag)]` marks the ETag field (`String` or `Option<String>`).
/// - `#[entity(timestamp)]` marks the field receiving the update timestamp (`i64` or `Option<i64>`).
///
/// The container attribute `#[entity(name = "...")]` overrides the type name used in
/// errors and logs.
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
/// pub struct Order {
///     #[entity(id)]
///     pub id: Option<String>,
///     #[entity(etag)]
///     pub etag: Option<String>,
///     #[entity(timestamp)]
///     pub updated: Option<i64>,
///     pub customer: String,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct EntityFields {
    id: Option<(Ident, bool)>,
    etag: Option<Ident>,
    timestamp: Option<Ident>,
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let type_name = parse_type_name(&input.attrs)?.unwrap_or_else(|| name.to_string());

    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    "#[derive(Entity)] requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "#[derive(Entity)] can only be applied to structs",
            ));
        }
    };

    let mut fields = EntityFields::default();
    let mut fallback_id = None;

    for field in named {
        let Some(ident) = field.ident.clone() else {
            continue;
        };

        if ident == "id" {
            fallback_id = Some(ident.clone());
        }

        parse_field_attrs(&field.attrs, &ident, &mut fields)?;
    }

    let (id, readonly) = match fields.id.take().or(fallback_id.map(|ident| (ident, false))) {
        Some(id) => id,
        None => {
            return Err(syn::Error::new(
                input.span(),
                "#[derive(Entity)] needs an `id` field or a field marked #[entity(id)]",
            ));
        }
    };

    let id_setter = (!readonly).then(|| {
        quote! {
            .id_setter(|entity: &mut Self, id: &str| ::docrepo::entity::IdValue::assign_id(&mut entity.#id, id))
        }
    });

    let etag = fields.etag.as_ref().map(|etag| {
        quote! {
            .etag(
                |entity: &Self| ::docrepo::entity::EtagValue::to_etag(&entity.#etag),
                |entity: &mut Self, etag: &str| ::docrepo::entity::EtagValue::assign_etag(&mut entity.#etag, etag),
            )
        }
    });

    let timestamp = fields.timestamp.as_ref().map(|timestamp| {
        quote! {
            .timestamp(|entity: &mut Self, timestamp: i64| {
                ::docrepo::entity::TimestampValue::assign_timestamp(&mut entity.#timestamp, timestamp)
            })
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docrepo::entity::Entity for #name #ty_generics #where_clause {
            fn descriptor() -> ::docrepo::entity::EntityDescriptor<Self> {
                ::docrepo::entity::EntityDescriptor::builder(
                    #type_name,
                    |entity: &Self| ::docrepo::entity::IdValue::to_id(&entity.#id),
                )
                #id_setter
                #etag
                #timestamp
                .build()
            }
        }
    })
}

fn parse_type_name(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut type_name = None;

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                type_name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported #[entity(...)] container option. Supported: name = \"...\""))
        })?;
    }

    Ok(type_name)
}

fn parse_field_attrs(attrs: &[syn::Attribute], ident: &Ident, fields: &mut EntityFields) -> syn::Result<()> {
    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        let mut is_id = false;
        let mut readonly = false;
        let mut is_etag = false;
        let mut is_timestamp = false;

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                is_id = true;
                return Ok(());
            }

            if meta.path.is_ident("readonly") {
                readonly = true;
                return Ok(());
            }

            if meta.path.is_ident("etag") {
                is_etag = true;
                return Ok(());
            }

            if meta.path.is_ident("timestamp") {
                is_timestamp = true;
                return Ok(());
            }

            Err(meta.error("Unsupported #[entity(...)] field option. Supported: id, readonly, etag, timestamp"))
        })?;

        if readonly && !is_id {
            return Err(syn::Error::new(attr.span(), "`readonly` only applies to #[entity(id)]"));
        }

        if is_id {
            if fields.id.is_some() {
                return Err(syn::Error::new(attr.span(), "Duplicate #[entity(id)] field"));
            }
            fields.id = Some((ident.clone(), readonly));
        }

        if is_etag {
            if fields.etag.is_some() {
                return Err(syn::Error::new(attr.span(), "Duplicate #[entity(etag)] field"));
            }
            fields.etag = Some(ident.clone());
        }

        if is_timestamp {
            if fields.timestamp.is_some() {
                return Err(syn::Error::new(attr.span(), "Duplicate #[entity(timestamp)] field"));
            }
            fields.timestamp = Some(ident.clone());
        }
    }

    Ok(())
}
