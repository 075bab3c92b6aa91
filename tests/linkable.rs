mod common;

use closure_table::{
    ClosureTableError, ClosureTableModel, LinkableRepository, NameMatch, NodeKind,
};
use common::menu_item::Model as MenuItem;
use common::{dead_link, menu_item, names, setup_database};

type Repo = LinkableRepository<MenuItem>;

#[tokio::test]
async fn link_can_be_cleared_back_to_normal() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = Repo::new();

    let menu = repo.create_root(&db, menu_item("menu")).await?;
    let target = repo.add_child(&db, Some(&menu), menu_item("target")).await?;
    let link = repo.add_child(&db, Some(&menu), menu_item("link")).await?;

    let link = repo.set_link(&db, &link, Some(&target)).await?;
    assert!(repo.is_link(&link));
    assert!(!repo.is_dead_link(&link));
    assert_eq!(
        link.node_kind(),
        NodeKind::Link {
            target: Some(target.id)
        }
    );

    let link = repo.set_link(&db, &link, None).await?;
    assert!(!repo.is_dead_link(&link));
    assert_eq!(link.node_kind(), NodeKind::Normal);
    assert_eq!(link.link_target_id, None);

    let dangling = repo.insert(&db, dead_link("dangling")).await?;
    assert!(repo.is_dead_link(&dangling));

    Ok(())
}

#[tokio::test]
async fn link_rules_are_enforced() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = Repo::new();

    let menu = repo.create_root(&db, menu_item("menu")).await?;
    let target = repo.add_child(&db, Some(&menu), menu_item("target")).await?;
    let link = repo.add_child(&db, Some(&menu), menu_item("link")).await?;
    let other = repo.add_child(&db, Some(&menu), menu_item("other")).await?;
    let link = repo.add_link_to(&db, &link, &target).await?;

    assert!(matches!(
        repo.set_link(&db, &other, Some(&link)).await,
        Err(ClosureTableError::ChainedLinkNotAllowed(_))
    ));

    let ghost = MenuItem {
        id: 999,
        name: "ghost".to_owned(),
        is_link: false,
        link_target_id: None,
        created_at: None,
        updated_at: None,
    };
    assert!(matches!(
        repo.set_link(&db, &other, Some(&ghost)).await,
        Err(ClosureTableError::TargetNotPersisted(_))
    ));
    assert!(matches!(
        repo.set_link(&db, &target, Some(&target)).await,
        Err(ClosureTableError::SelfLink(_))
    ));
    assert!(matches!(
        repo.set_link(&db, &menu, Some(&target)).await,
        Err(ClosureTableError::LinkNodeHasChildren(_))
    ));

    assert!(matches!(
        repo.add_child(&db, Some(&link), menu_item("child")).await,
        Err(ClosureTableError::LinkCannotHaveChildren(_))
    ));
    assert!(matches!(
        repo.move_to(&db, &other, Some(&link)).await,
        Err(ClosureTableError::LinkCannotHaveChildren(_))
    ));
    assert_eq!(names(&repo.children(&db, &menu).await?), vec!["target", "link", "other"]);

    Ok(())
}

#[tokio::test]
async fn referenced_node_cannot_become_a_link() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = Repo::new();

    let menu = repo.create_root(&db, menu_item("menu")).await?;
    let target = repo.add_child(&db, Some(&menu), menu_item("target")).await?;
    let other = repo.add_child(&db, Some(&menu), menu_item("other")).await?;
    let link = repo.add_child(&db, Some(&menu), menu_item("link")).await?;
    let link = repo.add_link_to(&db, &link, &target).await?;

    assert!(matches!(
        repo.set_link(&db, &target, Some(&other)).await,
        Err(ClosureTableError::ChainedLinkNotAllowed(_))
    ));
    let stored = repo.find(&db, &target.id).await?.expect("target exists");
    assert!(!repo.is_link(&stored));

    repo.remove_link_to(&db, &link).await?;
    let target = repo.add_link_to(&db, &target, &other).await?;
    assert!(repo.is_link(&target));

    Ok(())
}

#[tokio::test]
async fn stale_copy_of_a_link_still_refuses_children() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = Repo::new();

    let menu = repo.create_root(&db, menu_item("menu")).await?;
    let target = repo.add_child(&db, Some(&menu), menu_item("target")).await?;
    let stale = repo.add_child(&db, Some(&menu), menu_item("link")).await?;
    let other = repo.add_child(&db, Some(&menu), menu_item("other")).await?;
    repo.add_link_to(&db, &stale, &target).await?;
    assert!(!repo.is_link(&stale));

    assert!(matches!(
        repo.add_child(&db, Some(&stale), menu_item("child")).await,
        Err(ClosureTableError::LinkCannotHaveChildren(_))
    ));
    assert!(matches!(
        repo.move_to(&db, &other, Some(&stale)).await,
        Err(ClosureTableError::LinkCannotHaveChildren(_))
    ));
    assert!(matches!(
        repo.reparent(&db, &other.id, Some(&stale.id), 0).await,
        Err(ClosureTableError::LinkCannotHaveChildren(_))
    ));

    assert!(!repo.has_child(&db, &stale).await?);
    assert_eq!(names(&repo.children(&db, &menu).await?), vec!["target", "link", "other"]);
    assert!(repo.find_by_name(&db, "child", NameMatch::Exact).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn link_queries_scan_the_node_table() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = Repo::new();

    let menu = repo.create_root(&db, menu_item("menu")).await?;
    let target = repo.add_child(&db, Some(&menu), menu_item("target")).await?;
    let first = repo.add_child(&db, Some(&menu), menu_item("first")).await?;
    let second = repo.add_child(&db, Some(&menu), menu_item("second")).await?;
    let dangling = repo.add_child(&db, Some(&menu), dead_link("dangling")).await?;

    repo.add_link_to(&db, &first, &target).await?;
    repo.add_link_to(&db, &second, &target).await?;

    assert_eq!(names(&repo.find_linking(&db).await?), vec!["first", "second"]);
    assert_eq!(names(&repo.find_linked(&db).await?), vec!["target"]);
    assert_eq!(names(&repo.find_link_to(&db, &target).await?), vec!["first", "second"]);
    assert_eq!(names(&repo.find_dead_links(&db).await?), vec!["dangling"]);
    assert!(repo.is_referenced(&db, &target).await?);
    assert!(!repo.is_referenced(&db, &dangling).await?);

    let second = repo.find(&db, &second.id).await?.expect("second exists");
    repo.remove_link_to(&db, &second).await?;
    assert_eq!(names(&repo.find_link_to(&db, &target).await?), vec!["first"]);

    Ok(())
}

#[tokio::test]
async fn referenced_nodes_cannot_be_removed() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = Repo::new();

    let menu = repo.create_root(&db, menu_item("menu")).await?;
    let target = repo.add_child(&db, Some(&menu), menu_item("target")).await?;
    let link = repo.add_child(&db, Some(&menu), menu_item("link")).await?;
    let link = repo.add_link_to(&db, &link, &target).await?;

    assert!(matches!(
        repo.delete_path(&db, &target).await,
        Err(ClosureTableError::LinkedNodeStillReferenced(_))
    ));
    assert_eq!(repo.count_paths(&db, &target).await?, 2);

    repo.remove_link_to(&db, &link).await?;
    repo.delete_path(&db, &target).await?;
    assert!(repo.find(&db, &target.id).await?.is_none());
    assert_eq!(names(&repo.children(&db, &menu).await?), vec!["link"]);

    Ok(())
}

#[tokio::test]
async fn writes_stamp_timestamps() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = Repo::new();

    let node = repo.insert(&db, menu_item("stamped")).await?;
    let created = node.created_at.expect("created_at is set on insert");
    assert!(node.updated_at.is_some());

    let target = repo.insert(&db, menu_item("target")).await?;
    let linked = repo.add_link_to(&db, &node, &target).await?;
    assert_eq!(linked.created_at, Some(created));
    assert!(linked.updated_at >= node.updated_at);

    Ok(())
}
