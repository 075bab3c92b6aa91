use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Fields, Ident, Path, Type,
};

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
    id_field: Option<String>,
    id_type: Option<Type>,
    name_field: Option<String>,
    path_module: Option<Path>,
    path_table: Option<String>,
    entity_name: Option<String>,
    path_name: Option<String>,
    ancestor_field: Option<String>,
    descendant_field: Option<String>,
    depth_field: Option<String>,
    order_index_field: Option<String>,
    removal_policy: Option<String>,
    sibling_ordering: Option<String>,
    linkable: bool,
    link_flag_field: Option<String>,
    link_target_field: Option<String>,
    timestamps: bool,
    created_at_field: Option<String>,
    updated_at_field: Option<String>,
}

fn impl_closure_table_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_ident = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "ClosureTableModel can only be derived for structs",
            ))
        }
    };

    let mut options = Options::default();
    let mut table_name: Option<String> = None;

    for attr in &input.attrs {
        if attr.path().is_ident("closure_table") {
            parse_closure_table_attr(attr, &mut options)?;
        }

        if attr.path().is_ident("sea_orm") {
            if let Some(name) = parse_sea_orm_table_name(attr)? {
                table_name = Some(name);
            }
        }
    }

    let id_field_name = options.id_field.unwrap_or_else(|| "id".to_string());
    let name_field_name = options.name_field.unwrap_or_else(|| "name".to_string());
    let ancestor_field_name = options
        .ancestor_field
        .unwrap_or_else(|| "ancestor_id".to_string());
    let descendant_field_name = options
        .descendant_field
        .unwrap_or_else(|| "descendant_id".to_string());
    let depth_field_name = options.depth_field.unwrap_or_else(|| "depth".to_string());
    let order_index_field_name = options
        .order_index_field
        .unwrap_or_else(|| "order_index".to_string());

    let id_field_ident = Ident::new(&id_field_name, struct_ident.span());
    let name_field_ident = Ident::new(&name_field_name, struct_ident.span());
    let ancestor_field_ident = Ident::new(&ancestor_field_name, struct_ident.span());
    let descendant_field_ident = Ident::new(&descendant_field_name, struct_ident.span());
    let depth_field_ident = Ident::new(&depth_field_name, struct_ident.span());
    let order_index_field_ident = Ident::new(&order_index_field_name, struct_ident.span());

    let mut id_field_type: Option<Type> = options.id_type.clone();

    if let Fields::Named(ref fields) = data_struct.fields {
        for field in &fields.named {
            if let Some(ident) = &field.ident {
                if ident == &id_field_ident && id_field_type.is_none() {
                    id_field_type = Some(field.ty.clone());
                }
            }
        }
    } else {
        return Err(syn::Error::new(
            data_struct.fields.span(),
            "ClosureTableModel requires named fields",
        ));
    }

    let id_type = id_field_type.ok_or_else(|| {
        syn::Error::new(
            struct_ident.span(),
            "Unable to determine id field type; specify `id_type = ...` in #[closure_table]",
        )
    })?;

    let path_module = options
        .path_module
        .ok_or_else(|| syn::Error::new(struct_ident.span(), "`path_module` must be set"))?;

    let base_table = table_name.unwrap_or_else(|| struct_ident.unraw().to_string());
    let entity_name = options.entity_name.unwrap_or_else(|| base_table.clone());
    let path_name = options
        .path_name
        .unwrap_or_else(|| format!("{}Path", entity_name));
    let path_table = options
        .path_table
        .unwrap_or_else(|| format!("{}_paths", base_table));

    let id_column_variant = format_ident!("{}", to_pascal_case(&id_field_name));
    let name_column_variant = format_ident!("{}", to_pascal_case(&name_field_name));
    let ancestor_column_variant = format_ident!("{}", to_pascal_case(&ancestor_field_name));
    let descendant_column_variant = format_ident!("{}", to_pascal_case(&descendant_field_name));
    let depth_column_variant = format_ident!("{}", to_pascal_case(&depth_field_name));
    let order_index_column_variant =
        format_ident!("{}", to_pascal_case(&order_index_field_name));

    let path_table_literal = syn::LitStr::new(&path_table, struct_ident.span());
    let entity_name_literal = syn::LitStr::new(&entity_name, struct_ident.span());
    let path_name_literal = syn::LitStr::new(&path_name, struct_ident.span());

    let removal_policy = match options.removal_policy.as_deref() {
        None => quote! {},
        Some("retain") => {
            quote! { .removal_policy(::closure_table::RemovalPolicy::Retain) }
        }
        Some("remove") => {
            quote! { .removal_policy(::closure_table::RemovalPolicy::Remove) }
        }
        Some(other) => {
            return Err(syn::Error::new(
                struct_ident.span(),
                format!("Unknown removal_policy `{other}`; expected `retain` or `remove`"),
            ))
        }
    };
    let sibling_ordering = match options.sibling_ordering.as_deref() {
        None => quote! {},
        Some("stable") => {
            quote! { .sibling_ordering(::closure_table::SiblingOrdering::Stable) }
        }
        Some("shift") => {
            quote! { .sibling_ordering(::closure_table::SiblingOrdering::Shift) }
        }
        Some(other) => {
            return Err(syn::Error::new(
                struct_ident.span(),
                format!("Unknown sibling_ordering `{other}`; expected `stable` or `shift`"),
            ))
        }
    };

    let link_flag_ident = Ident::new(
        options.link_flag_field.as_deref().unwrap_or("is_link"),
        struct_ident.span(),
    );
    let link_target_ident = Ident::new(
        options
            .link_target_field
            .as_deref()
            .unwrap_or("link_target_id"),
        struct_ident.span(),
    );

    let node_kind = if options.linkable {
        quote! {
            fn node_kind(&self) -> ::closure_table::NodeKind<Self::Id> {
                if self.#link_flag_ident {
                    ::closure_table::NodeKind::Link {
                        target: self.#link_target_ident.clone(),
                    }
                } else {
                    ::closure_table::NodeKind::Normal
                }
            }
        }
    } else {
        TokenStream2::new()
    };

    let stamp = if options.timestamps {
        let created_ident = Ident::new(
            options.created_at_field.as_deref().unwrap_or("created_at"),
            struct_ident.span(),
        );
        let updated_ident = Ident::new(
            options.updated_at_field.as_deref().unwrap_or("updated_at"),
            struct_ident.span(),
        );
        quote! {
            fn stamp(active: &mut Self::ActiveModel, inserting: bool) {
                let now = ::closure_table::__private::chrono::Utc::now();
                if inserting {
                    active.#created_ident = ::sea_orm::ActiveValue::Set(::core::convert::Into::into(now));
                }
                active.#updated_ident = ::sea_orm::ActiveValue::Set(::core::convert::Into::into(now));
            }
        }
    } else {
        TokenStream2::new()
    };

    let linkable_impl = if options.linkable {
        let link_flag_variant =
            format_ident!("{}", to_pascal_case(&link_flag_ident.to_string()));
        let link_target_variant =
            format_ident!("{}", to_pascal_case(&link_target_ident.to_string()));
        quote! {
            impl ::closure_table::LinkableModel for #struct_ident {
                fn link_flag_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                    Column::#link_flag_variant
                }

                fn link_target_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                    Column::#link_target_variant
                }

                fn set_node_kind(
                    active: &mut Self::ActiveModel,
                    kind: ::closure_table::NodeKind<Self::Id>,
                ) {
                    match kind {
                        ::closure_table::NodeKind::Normal => {
                            active.#link_flag_ident = ::sea_orm::ActiveValue::Set(false);
                            active.#link_target_ident = ::sea_orm::ActiveValue::Set(None);
                        }
                        ::closure_table::NodeKind::Link { target } => {
                            active.#link_flag_ident = ::sea_orm::ActiveValue::Set(true);
                            active.#link_target_ident = ::sea_orm::ActiveValue::Set(target);
                        }
                    }
                }
            }
        }
    } else {
        TokenStream2::new()
    };

    let generated = quote! {
        impl ::closure_table::ClosureTableModel for #struct_ident {
            type Entity = Entity;
            type ActiveModel = ActiveModel;
            type Id = #id_type;

            type PathEntity = #path_module::Entity;
            type PathModel = #path_module::Model;
            type PathActiveModel = #path_module::ActiveModel;

            fn closure_table_config() -> &'static ::closure_table::ClosureTableConfig {
                static CONFIG: ::closure_table::__private::Lazy<::closure_table::ClosureTableConfig> =
                    ::closure_table::__private::Lazy::new(|| {
                        let base = ::closure_table::ClosureTableConfig::new(
                            #entity_name_literal,
                            #path_name_literal,
                        );
                        ::closure_table::ClosureTableOptions::default()
                            .path_table(#path_table_literal)
                            #removal_policy
                            #sibling_ordering
                            .apply(base)
                    });
                &CONFIG
            }

            fn id(&self) -> Self::Id {
                self.#id_field_ident.clone()
            }

            fn active_id(active: &Self::ActiveModel) -> Option<Self::Id> {
                let id = match &active.#id_field_ident {
                    ::sea_orm::ActiveValue::Set(id) | ::sea_orm::ActiveValue::Unchanged(id) => {
                        Some(id.clone())
                    }
                    ::sea_orm::ActiveValue::NotSet => None,
                };
                id.filter(|id| !<Self as ::closure_table::ClosureTableModel>::is_null_id(id))
            }

            fn id_to_value(id: &Self::Id) -> ::sea_orm::Value {
                ::sea_orm::Value::from(id.clone())
            }

            fn is_null_id(id: &Self::Id) -> bool {
                *id == <Self::Id as ::core::default::Default>::default()
            }

            fn name(&self) -> &str {
                self.#name_field_ident.as_str()
            }

            fn set_name(active: &mut Self::ActiveModel, name: &str) {
                active.#name_field_ident = ::sea_orm::ActiveValue::Set(name.to_owned());
            }

            #node_kind

            #stamp

            fn id_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#id_column_variant
            }

            fn name_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#name_column_variant
            }

            fn path_ancestor_column() -> <Self::PathEntity as ::sea_orm::EntityTrait>::Column {
                #path_module::Column::#ancestor_column_variant
            }

            fn path_descendant_column() -> <Self::PathEntity as ::sea_orm::EntityTrait>::Column {
                #path_module::Column::#descendant_column_variant
            }

            fn path_depth_column() -> <Self::PathEntity as ::sea_orm::EntityTrait>::Column {
                #path_module::Column::#depth_column_variant
            }

            fn path_order_index_column() -> <Self::PathEntity as ::sea_orm::EntityTrait>::Column {
                #path_module::Column::#order_index_column_variant
            }

            fn path_model_ancestor(model: &Self::PathModel) -> Self::Id {
                model.#ancestor_field_ident.clone()
            }

            fn path_model_descendant(model: &Self::PathModel) -> Self::Id {
                model.#descendant_field_ident.clone()
            }

            fn path_model_depth(model: &Self::PathModel) -> i32 {
                model.#depth_field_ident
            }

            fn path_model_order_index(model: &Self::PathModel) -> i32 {
                model.#order_index_field_ident
            }

            fn path_build_row(
                ancestor: Self::Id,
                descendant: Self::Id,
                core: ::closure_table::PathCore,
            ) -> Self::PathActiveModel {
                #[allow(clippy::needless_update)]
                {
                    #path_module::ActiveModel {
                        #ancestor_field_ident: ::sea_orm::ActiveValue::Set(ancestor),
                        #descendant_field_ident: ::sea_orm::ActiveValue::Set(descendant),
                        #depth_field_ident: ::sea_orm::ActiveValue::Set(core.depth as i32),
                        #order_index_field_ident: ::sea_orm::ActiveValue::Set(core.order_index),
                        ..::core::default::Default::default()
                    }
                }
            }
        }

        #linkable_impl
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
            "linkable" => options.linkable = true,
            "timestamps" => options.timestamps = true,
            "id_type" => {
                let ty: Type = meta.value()?.parse()?;
                options.id_type = Some(ty);
            }
            "path_module" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.path_module = Some(parse_path(&value.value(), value.span())?);
            }
            key => {
                let value: syn::LitStr = meta.value()?.parse()?;
                let slot = match key {
                    "id_field" => &mut options.id_field,
                    "name_field" => &mut options.name_field,
                    "path_table" => &mut options.path_table,
                    "entity_name" => &mut options.entity_name,
                    "path_name" => &mut options.path_name,
                    "ancestor_field" => &mut options.ancestor_field,
                    "descendant_field" => &mut options.descendant_field,
                    "depth_field" => &mut options.depth_field,
                    "order_index_field" => &mut options.order_index_field,
                    "removal_policy" => &mut options.removal_policy,
                    "sibling_ordering" => &mut options.sibling_ordering,
                    "link_flag_field" => &mut options.link_flag_field,
                    "link_target_field" => &mut options.link_target_field,
                    "created_at_field" => &mut options.created_at_field,
                    "updated_at_field" => &mut options.updated_at_field,
                    other => {
                        return Err(syn::Error::new(
                            meta.path.span(),
                            format!("Unsupported closure_table option `{other}`"),
                        ));
                    }
                };
                *slot = Some(value.value());
            }
        }

        Ok(())
    })
}

fn parse_sea_orm_table_name(attr: &Attribute) -> syn::Result<Option<String>> {
    let mut table_name: Option<String> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table_name") {
            let value: syn::LitStr = meta.value()?.parse()?;
            table_name = Some(value.value());
        } else if meta.input.peek(syn::Token![=]) {
            let _: syn::Expr = meta.value()?.parse()?;
        }
        Ok(())
    })?;
    Ok(table_name)
}

fn parse_path(value: &str, span: proc_macro2::Span) -> syn::Result<Path> {
    syn::parse_str::<Path>(value).map_err(|_| syn::Error::new(span, "Invalid path"))
}

fn to_pascal_case(value: &str) -> String {
    value
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
