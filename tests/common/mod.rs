#![allow(dead_code)]

use closure_table::ClosureTableModel;
use sea_orm::{
    ActiveValue::Set, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    DbErr, Statement,
};

pub mod category {
    use closure_table::ClosureTableModelDerive as ClosureTableModel;
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, DeriveEntityModel, ClosureTableModel)]
    #[sea_orm(table_name = "categories")]
    #[closure_table(path_module = "crate::common::category_path")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod category_path {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "categories_paths")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub ancestor_id: i32,
        #[sea_orm(primary_key, auto_increment = false)]
        pub descendant_id: i32,
        pub depth: i32,
        pub order_index: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod menu_item {
    use closure_table::ClosureTableModelDerive as ClosureTableModel;
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, DeriveEntityModel, ClosureTableModel)]
    #[sea_orm(table_name = "menu_items")]
    #[closure_table(
        path_module = "crate::common::menu_item_path",
        linkable,
        timestamps,
        removal_policy = "remove"
    )]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub name: String,
        pub is_link: bool,
        pub link_target_id: Option<i32>,
        pub created_at: Option<DateTimeUtc>,
        pub updated_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod menu_item_path {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "menu_items_paths")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub ancestor_id: i32,
        #[sea_orm(primary_key, auto_increment = false)]
        pub descendant_id: i32,
        pub depth: i32,
        pub order_index: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE categories_paths (
        ancestor_id INTEGER NOT NULL REFERENCES categories(id),
        descendant_id INTEGER NOT NULL REFERENCES categories(id),
        depth INTEGER NOT NULL,
        order_index INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (ancestor_id, descendant_id)
    );
    "#,
    r#"
    CREATE TABLE menu_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        is_link BOOLEAN NOT NULL DEFAULT FALSE,
        link_target_id INTEGER REFERENCES menu_items(id),
        created_at TEXT,
        updated_at TEXT
    );
    "#,
    r#"
    CREATE TABLE menu_items_paths (
        ancestor_id INTEGER NOT NULL REFERENCES menu_items(id),
        descendant_id INTEGER NOT NULL REFERENCES menu_items(id),
        depth INTEGER NOT NULL,
        order_index INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (ancestor_id, descendant_id)
    );
    "#,
];

/// Fresh in-memory SQLite database with both schemas created.
pub async fn setup_database() -> Result<DatabaseConnection, DbErr> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    for ddl in SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, *ddl))
            .await?;
    }

    Ok(db)
}

pub fn category(name: &str) -> category::ActiveModel {
    category::ActiveModel {
        name: Set(name.to_owned()),
        ..Default::default()
    }
}

pub fn menu_item(name: &str) -> menu_item::ActiveModel {
    menu_item::ActiveModel {
        name: Set(name.to_owned()),
        is_link: Set(false),
        link_target_id: Set(None),
        ..Default::default()
    }
}

pub fn dead_link(name: &str) -> menu_item::ActiveModel {
    menu_item::ActiveModel {
        is_link: Set(true),
        ..menu_item(name)
    }
}

pub fn names<M: ClosureTableModel>(nodes: &[M]) -> Vec<String> {
    nodes.iter().map(|node| node.name().to_owned()).collect()
}
