//! Derive macro for `Message`.
use proc_macro2::TokenStream;
use quote::{format_ident, quote, quote_spanned};
use syn::{parse_macro_input, spanned::Spanned, Data, DeriveInput, Fields, Index};

/// Derive macro that implements the `Message` trait by serializing fields in
/// declaration order.  Using this macro requires that `Message` and `Error`
/// (the wire error type) are locally `use`d.
#[proc_macro_derive(Message)]
pub fn derive_message(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_message_internal(&input)
}

fn derive_message_internal(input: &DeriveInput) -> proc_macro::TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let size = size_struct(&input.data);
    let ser = serialize_struct(&input.data);
    let de = deserialize_struct(&input.data);

    let expanded = quote! {
        impl #impl_generics Message for #name #ty_generics #where_clause {
            fn serialized_size(&self) -> usize {
                #size
            }
            fn serialize_into(&self, buf: &mut alloc::vec::Vec<u8>) -> Result<(), Error> {
                #ser
            }
            fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
                #de
            }
        }
    };

    expanded.into()
}

/// Generate an expression summing the serialized size of every field.
fn size_struct(data: &Data) -> TokenStream {
    match data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => {
                let recurse = fields.named.iter().map(|f| {
                    let name = &f.ident;
                    quote_spanned! {f.span()=>
                        Message::serialized_size(&self.#name)
                    }
                });
                quote! { 0usize #(+ #recurse)* }
            }
            Fields::Unnamed(fields) => {
                let recurse = fields.unnamed.iter().enumerate().map(|(i, f)| {
                    let index = Index::from(i);
                    quote_spanned! {f.span()=>
                        Message::serialized_size(&self.#index)
                    }
                });
                quote! { 0usize #(+ #recurse)* }
            }
            Fields::Unit => quote! { 0usize },
        },
        _ => unimplemented!("Message can only be derived for structs"),
    }
}

/// Generate an expression serializing every field in declaration order.
fn serialize_struct(data: &Data) -> TokenStream {
    match data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => {
                let recurse = fields.named.iter().map(|f| {
                    let name = &f.ident;
                    quote_spanned! {f.span()=>
                        Message::serialize_into(&self.#name, buf)?;
                    }
                });
                quote! {
                    #(#recurse)*
                    Ok(())
                }
            }
            Fields::Unnamed(fields) => {
                let recurse = fields.unnamed.iter().enumerate().map(|(i, f)| {
                    let index = Index::from(i);
                    quote_spanned! {f.span()=>
                        Message::serialize_into(&self.#index, buf)?;
                    }
                });
                quote! {
                    #(#recurse)*
                    Ok(())
                }
            }
            Fields::Unit => quote! { Ok(()) },
        },
        _ => unimplemented!("Message can only be derived for structs"),
    }
}

/// Generate an expression deserializing every field in declaration order.
fn deserialize_struct(data: &Data) -> TokenStream {
    match data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => {
                let recurse = fields.named.iter().map(|f| {
                    let name = &f.ident;
                    let typ = &f.ty;
                    quote_spanned! {f.span()=>
                        let (#name, data) = <#typ as Message>::deserialize(data)?;
                    }
                });
                let names = fields.named.iter().map(|f| &f.ident);
                quote! {
                    #(#recurse)*
                    Ok((Self { #(#names, )* }, data))
                }
            }
            Fields::Unnamed(fields) => {
                let recurse = fields.unnamed.iter().enumerate().map(|(i, f)| {
                    let typ = &f.ty;
                    let varname = format_ident!("field_{}", i);
                    quote_spanned! {f.span()=>
                        let (#varname, data) = <#typ as Message>::deserialize(data)?;
                    }
                });
                let names = (0..fields.unnamed.len()).map(|i| format_ident!("field_{}", i));
                quote! {
                    #(#recurse)*
                    Ok((Self( #(#names, )* ), data))
                }
            }
            Fields::Unit => quote! { Ok((Self, data)) },
        },
        _ => unimplemented!("Message can only be derived for structs"),
    }
}
