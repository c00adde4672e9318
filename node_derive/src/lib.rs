#![recursion_limit = "128"]
//! `#[derive(Node)]` for pipeline stages.
//!
//! Fields typed `NodeReceiver<T>` become inputs, received in declaration
//! order and handed to the stage's `run` method. Fields typed
//! `NodeSender<T>` receive a clone of whatever `run` returns. Everything
//! else is state owned by the stage. Marking the struct `#[aggregate]`
//! means `run` returns `Result<Option<T>, NodeError>` and only `Some`
//! values are forwarded.
extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

enum FieldType {
    Input,
    Output,
    State,
}

#[proc_macro_derive(Node, attributes(aggregate))]
pub fn node_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) =
        input.generics.split_for_impl();
    let aggregate = input
        .attrs
        .iter()
        .any(|attr| attr.path.segments.iter().any(|s| s.ident == "aggregate"));

    let mut recv_fields = vec![];
    let mut send_fields = vec![];
    match input.data {
        syn::Data::Struct(ref data_struct) => match data_struct.fields {
            syn::Fields::Named(ref fields) => {
                for field in &fields.named {
                    match parse_type(field) {
                        FieldType::Input => recv_fields.push(field),
                        FieldType::Output => send_fields.push(field),
                        FieldType::State => (),
                    }
                }
            }
            _ => panic!("Node derive needs named fields."),
        },
        _ => panic!("Node derive only supports structures."),
    }

    let recv_idents: Vec<syn::Ident> = recv_fields
        .iter()
        .filter_map(|x| x.ident.clone())
        .collect();
    let send_idents: Vec<syn::Ident> = send_fields
        .iter()
        .filter_map(|x| x.ident.clone())
        .collect();

    // Each repetition below gets its own binding.
    let recv_fetch = &recv_idents;
    let recv_bind = &recv_idents;
    let recv_args = &recv_idents;
    let recv_check = &recv_idents;
    let send_prime = &send_idents;
    let send_out = &send_idents;
    let send_check = &send_idents;

    let forward = if aggregate {
        quote! {
            if let Some(res) = self.run(#(#recv_args),*)? {
                #(
                    for (send, _) in &self.#send_out {
                        send.send(res.clone()).map_err(|_| NodeError::CommError)?;
                    }
                )*
            }
        }
    } else {
        quote! {
            let res = self.run(#(#recv_args),*)?;
            #(
                for (send, _) in &self.#send_out {
                    send.send(res.clone()).map_err(|_| NodeError::CommError)?;
                }
            )*
        }
    };

    let expanded = quote! {
        impl #impl_generics Node for #name #ty_generics #where_clause {
            fn start(&mut self) {
                #(
                    for (send, default) in &self.#send_prime {
                        if let Some(val) = default {
                            if send.send(val.clone()).is_err() {
                                return;
                            }
                        }
                    }
                )*
                while self.call().is_ok() {}
            }

            #[allow(unused_variables)]
            fn call(&mut self) -> Result<(), NodeError> {
                #(
                    let #recv_bind = match self.#recv_fetch {
                        Some(ref r) => r.recv().map_err(|_| NodeError::CommError)?,
                        None => return Err(NodeError::PermanentError),
                    };
                )*
                #forward
                Ok(())
            }

            fn is_connected(&self) -> bool {
                true #( && self.#recv_check.is_some() )* #( && !self.#send_check.is_empty() )*
            }
        }
    };
    expanded.into()
}

fn parse_type(field: &syn::Field) -> FieldType {
    if let syn::Type::Path(ref tp) = field.ty {
        if let Some(seg) = tp.path.segments.iter().last() {
            if seg.ident == "NodeReceiver" {
                return FieldType::Input;
            }
            if seg.ident == "NodeSender" {
                return FieldType::Output;
            }
        }
    }
    FieldType::State
}
