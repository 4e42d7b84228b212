use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod from_particle;
mod from_particles;

#[proc_macro_derive(FromParticle, attributes(field))]
pub fn derive_from_particle(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match from_particle::expand_from_particle(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}

#[proc_macro_derive(FromParticles, attributes(particle))]
pub fn derive_from_particles(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match from_particles::expand_from_particles(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}
