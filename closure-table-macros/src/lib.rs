use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, LitBool, LitStr};

/// Binds a type to its entity table and closure table.
///
/// ```ignore
/// #[derive(ClosureTableModel)]
/// #[closure_table(entity_table = "categories", closure_table = "category_closure")]
/// pub struct Category;
/// ```
#[proc_macro_derive(ClosureTableModel, attributes(closure_table))]
pub fn derive_closure_table_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_closure_table_model(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct Options {
    entity_class: Option<LitStr>,
    entity_table: Option<LitStr>,
    closure_class: Option<LitStr>,
    closure_table: Option<LitStr>,
    namespace: Option<LitStr>,
    use_extra_storage_options: Option<LitBool>,
    position_policy: Option<TokenStream2>,
    dependent_behavior: Option<TokenStream2>,
}

fn impl_closure_table_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_ident = &input.ident;

    if !matches!(input.data, Data::Struct(_)) {
        return Err(syn::Error::new(
            input.span(),
            "ClosureTableModel can only be derived for structs",
        ));
    }

    let mut options = Options::default();
    let mut sea_orm_table: Option<String> = None;

    for attr in &input.attrs {
        if attr.path().is_ident("closure_table") {
            parse_closure_table_attr(attr, &mut options)?;
        }

        if attr.path().is_ident("sea_orm") {
            if let Some(name) = parse_sea_orm_table_name(attr)? {
                sea_orm_table = Some(name);
            }
        }
    }

    let span = struct_ident.span();
    let entity_class = options
        .entity_class
        .unwrap_or_else(|| LitStr::new(&struct_ident.unraw().to_string(), span));
    let entity_table = options.entity_table.unwrap_or_else(|| {
        let table = sea_orm_table
            .unwrap_or_else(|| format!("{}s", to_snake_case(&entity_class.value())));
        LitStr::new(&table, span)
    });

    let mut setters = Vec::new();
    if let Some(closure_class) = options.closure_class {
        setters.push(quote! { .closure_class(#closure_class) });
    }
    if let Some(closure_table) = options.closure_table {
        setters.push(quote! { .closure_table(#closure_table) });
    }
    match options.namespace {
        Some(namespace) => setters.push(quote! { .namespace(#namespace) }),
        None => setters.push(quote! { .namespace(::core::module_path!()) }),
    }
    if let Some(extra) = options.use_extra_storage_options {
        setters.push(quote! { .use_extra_storage_options(#extra) });
    }
    if let Some(policy) = options.position_policy {
        setters.push(quote! { .position_policy(#policy) });
    }
    if let Some(behavior) = options.dependent_behavior {
        setters.push(quote! { .dependent_behavior(#behavior) });
    }

    let generated = quote! {
        impl ::closure_table::ClosureTableModel for #struct_ident {
            fn closure_table_config() -> &'static ::closure_table::ClosureTableConfig {
                use ::closure_table::__private::Lazy;

                static CONFIG: Lazy<::closure_table::ClosureTableConfig> =
                    Lazy::new(|| {
                        let base = ::closure_table::ClosureTableConfig::new(
                            #entity_class,
                            #entity_table,
                        );
                        ::closure_table::ClosureTableOptions::default()
                            #(#setters)*
                            .apply(base)
                    });
                &CONFIG
            }
        }
    };

    Ok(generated.into())
}

fn parse_closure_table_attr(attr: &Attribute, options: &mut Options) -> syn::Result<()> {
    attr.parse_nested_meta(|meta| {
        let ident = meta
            .path
            .get_ident()
            .ok_or_else(|| syn::Error::new(meta.path.span(), "Invalid option key"))?
            .to_string();

        match ident.as_str() {
            "entity_class" => options.entity_class = Some(meta.value()?.parse()?),
            "entity_table" => options.entity_table = Some(meta.value()?.parse()?),
            "closure_class" => options.closure_class = Some(meta.value()?.parse()?),
            "closure_table" => options.closure_table = Some(meta.value()?.parse()?),
            "namespace" => options.namespace = Some(meta.value()?.parse()?),
            "use_extra_storage_options" => {
                options.use_extra_storage_options = Some(meta.value()?.parse()?);
            }
            "position_policy" => {
                let value: LitStr = meta.value()?.parse()?;
                options.position_policy = Some(match value.value().as_str() {
                    "auto_shift" => quote! { ::closure_table::PositionPolicy::AutoShift },
                    "reject" => quote! { ::closure_table::PositionPolicy::Reject },
                    _ => {
                        return Err(syn::Error::new(
                            value.span(),
                            "expected `auto_shift` or `reject`",
                        ))
                    }
                });
            }
            "dependent" => {
                let value: LitStr = meta.value()?.parse()?;
                options.dependent_behavior = Some(match value.value().as_str() {
                    "nullify" => quote! { ::closure_table::DependentBehavior::Nullify },
                    "destroy" => quote! { ::closure_table::DependentBehavior::Destroy },
                    _ => {
                        return Err(syn::Error::new(
                            value.span(),
                            "expected `nullify` or `destroy`",
                        ))
                    }
                });
            }
            other => {
                return Err(syn::Error::new(
                    meta.path.span(),
                    format!("Unsupported closure_table option `{other}`"),
                ));
            }
        }

        Ok(())
    })
}

fn parse_sea_orm_table_name(attr: &Attribute) -> syn::Result<Option<String>> {
    let mut table_name: Option<String> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table_name") {
            let value: LitStr = meta.value()?.parse()?;
            table_name = Some(value.value());
        } else if meta.input.peek(syn::Token![=]) {
            // Skip the values of other sea_orm keys.
            let _: syn::Expr = meta.value()?.parse()?;
        }
        Ok(())
    })?;
    Ok(table_name)
}

fn to_snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for (index, ch) in value.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
