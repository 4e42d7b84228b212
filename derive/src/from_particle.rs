use std::collections::HashMap;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as Tokens};
use quote::{ToTokens, format_ident, quote};
use syn::{
    Data, DeriveInput, Error, ExprClosure, Field, Fields, GenericArgument, Ident, LitStr, Pat,
    PathArguments, Result, Token, Type,
    parse::{Parse, ParseStream},
    spanned::Spanned,
};

/// The receiver method for values of a primitive type, and the type of value
/// it receives.
fn receiver(primitive: &Type) -> Result<(Ident, Tokens)> {
    let name = primitive.to_token_stream().to_string().replace(' ', "");

    let (method, value) = match name.as_str() {
        "u64" => ("u64", quote! { u64 }),
        "i64" => ("i64", quote! { i64 }),
        "f64" => ("f64", quote! { f64 }),
        "bool" => ("bool", quote! { bool }),
        "String" | "&str" => ("text", quote! { &str }),
        _ => Err(Error::new_spanned(
            primitive,
            "Field primitive must be one of `u64`, `i64`, `f64`, `bool`, `String` or `&str`.",
        ))?,
    };

    Ok((format_ident!("add_{}", method), value))
}

/// `T` of a field declared `Option<T>`.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last().filter(|s| s.ident == "Option")?;
    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };

    match arguments.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// Store `value` into the field `name`, through its handler if it has one.
fn store(target: &Target, value: Tokens) -> Tokens {
    let Target { name, handler } = target;

    match handler {
        Some((field_type, handler)) => {
            let mut params = handler.inputs.iter();
            let (acc, val) = (params.next(), params.next());
            let body = &handler.body;

            quote! { (|#acc: &mut #field_type, #val| { #body })(&mut self.#name, #value) }
        }
        None => quote! { self.#name = Some(#value) },
    }
}

pub(crate) fn expand_from_particle(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        Err(Error::new(
            input.span(),
            "`FromParticle` may only be derived on structs.",
        ))?
    };

    let Fields::Named(fields) = &data.fields else {
        Err(Error::new(
            input.span(),
            "`FromParticle` may only be derived on structs with named fields.",
        ))?
    };

    // Per receiver method: the value type it takes and the fields it fills.
    let mut by_method: HashMap<Ident, (Tokens, Vec<(LitStr, Target)>)> = HashMap::new();
    let mut time: Option<Target> = None;

    for field in &fields.named {
        let Some(parsed) = ParticleField::parse(field)? else {
            continue;
        };

        match parsed.key {
            Key::Name(key) => {
                let (method, value) = receiver(&parsed.primitive)?;
                let (_, cases) = by_method.entry(method).or_insert((value, Vec::new()));

                if cases.iter().any(|(existing, _)| existing.value() == key.value()) {
                    Err(Error::new(key.span(), "Field names must be unique."))?;
                }

                cases.push((key, parsed.target));
            }
            Key::Time if time.is_some() => {
                Err(Error::new(parsed.span, "Only one field may receive the time."))?
            }
            Key::Time => time = Some(parsed.target),
        }
    }

    let field_methods = by_method.into_iter().map(|(method, (value_type, cases))| {
        let text = method == "add_text";

        let arms = cases.into_iter().map(|(key, target)| {
            let value = if text && target.handler.is_none() {
                quote! { value.to_owned() }
            } else {
                quote! { value }
            };
            let assignment = store(&target, value);

            quote! { #key => { #assignment; } }
        });

        quote! {
            fn #method(&mut self, field: &str, value: #value_type) {
                match field {
                    #(#arms)*
                    _ => {}
                }
            }
        }
    });

    let time_method = time.map(|target| {
        let assignment = store(&target, quote! { timestamp });

        quote! {
            fn add_timestamp(&mut self, timestamp: ::mooring::particle::Timestamp) {
                #assignment;
            }
        }
    });

    let name = &input.ident;

    let expanded = quote! {
        impl ::mooring::particle::FromParticle for #name {
            #(#field_methods)*
            #time_method
        }
    };

    Ok(expanded.into())
}

/// The struct field a particle field is stored into.
struct Target {
    name: Ident,
    /// The field's type and the closure accumulating into it.
    handler: Option<(Type, ExprClosure)>,
}

enum Key {
    Name(LitStr),
    Time,
}

/// A struct field annotated with `#[field(..)]`.
struct ParticleField {
    key: Key,
    primitive: Type,
    target: Target,
    span: Span,
}

impl ParticleField {
    fn parse(field: &Field) -> Result<Option<Self>> {
        let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("field")) else {
            return Ok(None);
        };

        let Some(name) = field.ident.clone() else {
            Err(Error::new_spanned(field, "Field must be named."))?
        };

        let FieldAttribute { key, handler } = attr.meta.require_list()?.parse_args()?;

        // A handler declares the primitive it takes; otherwise the field is
        // an `Option` of it.
        let primitive = match &handler {
            Some(handler) => match handler.inputs.iter().nth(1) {
                Some(Pat::Type(typed)) => (*typed.ty).clone(),
                _ => Err(Error::new_spanned(
                    handler,
                    "Handler closure must take the field and a value annotated with its primitive type.",
                ))?,
            },
            None => match option_inner(&field.ty) {
                Some(inner) => inner.clone(),
                None => Err(Error::new_spanned(
                    &field.ty,
                    "Field without a handler must have type `Option<T>`.",
                ))?,
            },
        };

        Ok(Some(Self {
            key,
            primitive,
            target: Target {
                name,
                handler: handler.map(|h| (field.ty.clone(), h)),
            },
            span: attr.span(),
        }))
    }
}

/// `"name"` or `time`, optionally followed by a handler closure.
struct FieldAttribute {
    key: Key,
    handler: Option<ExprClosure>,
}

impl Parse for FieldAttribute {
    fn parse(input: ParseStream) -> Result<Self> {
        let key = if input.peek(LitStr) {
            Key::Name(input.parse()?)
        } else {
            let ident = input.parse::<Ident>()?;
            if ident != "time" {
                Err(Error::new_spanned(
                    ident,
                    "Field key must be a string literal or `time`.",
                ))?
            }
            Key::Time
        };

        let handler = input
            .parse::<Option<Token![,]>>()?
            .map(|_| input.parse::<ExprClosure>())
            .transpose()?;

        Ok(Self { key, handler })
    }
}
