use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result, Type,
    parse::{Parse, ParseStream},
};

pub(crate) fn expand_from_particles(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        Err(Error::new_spanned(
            input,
            "`FromParticles` may only be derived on structs.",
        ))?
    };

    let Fields::Named(fields) = &data.fields else {
        Err(Error::new_spanned(
            input,
            "`FromParticles` may only be derived on structs with named fields.",
        ))?
    };

    let fields = fields
        .named
        .iter()
        .map(FieldMetadata::parse)
        .filter_map(Result::transpose) // Skip fields without an attribute.
        .collect::<Result<Vec<_>>>()?;

    let mut kinds = Vec::new();
    for field in &fields {
        if kinds.contains(&field.kind.value()) {
            Err(Error::new_spanned(
                &field.kind,
                "Particle kinds must be unique.",
            ))?;
        }
        kinds.push(field.kind.value());
    }

    let cases = fields.iter().map(|field| {
        let FieldMetadata { name, kind, is_vec } = field;

        let assignment = if *is_vec {
            quote! {
                self.#name.push(Default::default());
                self.#name.last_mut().map(|p| p as _)
            }
        } else {
            quote! {
                Some(self.#name.insert(Default::default()))
            }
        };

        quote! { #kind => { #assignment } }
    });

    let name = &input.ident;

    let expanded = quote! {
        impl ::mooring::particle::FromParticles for #name {
            fn add_particle(
                &mut self,
                kind: &str,
            ) -> Option<&mut dyn ::mooring::particle::FromParticle> {
                match kind {
                    #(#cases)*
                    _ => None,
                }
            }
        }
    };

    Ok(expanded.into())
}

#[derive(Debug)]
struct FieldMetadata {
    name: Ident,
    kind: LitStr,
    is_vec: bool,
}

impl FieldMetadata {
    fn parse(field: &Field) -> Result<Option<Self>> {
        let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("particle")) else {
            return Ok(None);
        };

        let Some(name) = field.ident.clone() else {
            Err(Error::new_spanned(field, "Field must be named."))?
        };

        let ParticleAttribute { kind } = attr.meta.require_list()?.parse_args()?;

        let Type::Path(path) = &field.ty else {
            Err(Error::new_spanned(
                &field.ty,
                "Field must have a type annotation.",
            ))?
        };

        let Some(segment) = path.path.segments.first() else {
            Err(Error::new_spanned(
                &path.path.segments,
                "Field must have an `Option<T>` or `Vec<T>` type.",
            ))?
        };

        let is_vec = if segment.ident == "Option" {
            false
        } else if segment.ident == "Vec" {
            true
        } else {
            Err(Error::new_spanned(
                &segment.ident,
                "Field must have an `Option<T>` or `Vec<T>` type.",
            ))?
        };

        Ok(Some(Self { name, kind, is_vec }))
    }
}

#[derive(Debug)]
struct ParticleAttribute {
    kind: LitStr,
}

impl Parse for ParticleAttribute {
    fn parse(input: ParseStream) -> Result<Self> {
        let kind = input.parse::<LitStr>()?;
        Ok(Self { kind })
    }
}
