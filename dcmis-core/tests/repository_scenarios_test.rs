//! End-to-end repository scenarios through the public API

use dcmis_core::{
    CheckIn, ContentStream, CreateDocument, CreateFolder, CreatePolicy, ErrorKind, Inclusion,
    ObjectId, Paging, Properties, PropertyUpdates, Repository, RepositoryConfig, Unfiling, Value,
    VersioningState, cmis_props,
};

fn repo() -> Repository {
    Repository::open(RepositoryConfig::default()).unwrap()
}

async fn folder(repo: &Repository, parent: &ObjectId, name: &str) -> ObjectId {
    repo.create_folder(CreateFolder::new(Properties::typed("cmis:folder", name), parent))
        .await
        .unwrap()
}

async fn document(repo: &Repository, parent: &ObjectId, name: &str) -> ObjectId {
    repo.create_document(
        CreateDocument::new(Properties::typed("cmis:document", name))
            .in_folder(parent)
            .with_content(ContentStream::new("", "application/octet-stream")),
    )
    .await
    .unwrap()
}

async fn child_names(repo: &Repository, folder: &ObjectId) -> Vec<String> {
    repo.get_children(folder, &Inclusion::new(), None, &Paging::default())
        .await
        .unwrap()
        .iter()
        .filter_map(|e| e.name().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_create_list_and_delete_documents() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let f = folder(&repo, &root, "F").await;
    let apple = document(&repo, &f, "apple1").await;
    document(&repo, &f, "banana1").await;

    let page = repo
        .get_children(&f, &Inclusion::new(), None, &Paging::default())
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert!(!page.has_more_items);
    assert_eq!(page.items[0].content.as_ref().unwrap().length, 0);

    repo.delete_object(&apple, true).await.unwrap();
    assert_eq!(child_names(&repo, &f).await, vec!["banana1"]);
}

#[tokio::test]
async fn test_major_check_out_check_in_cycle() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let d = repo
        .create_document(
            CreateDocument::new(Properties::typed("cmis:document", "D"))
                .in_folder(&root)
                .with_content(ContentStream::new("body", "text/plain"))
                .versioning_state(VersioningState::Major),
        )
        .await
        .unwrap();
    let series = repo
        .get_object(&d, &Inclusion::new())
        .await
        .unwrap()
        .series_id()
        .cloned()
        .unwrap();

    let out = repo.check_out(&d).await.unwrap();
    assert!(out.content_copied);

    let d2 = repo
        .check_in(&out.pwc_id, CheckIn::major().with_comment("comment"))
        .await
        .unwrap();
    let latest = repo
        .get_latest_version(&series, true, &Inclusion::new())
        .await
        .unwrap();
    assert_eq!(latest.id, d2);
    assert_eq!(latest.version.as_ref().unwrap().label, "2.0");
    assert_eq!(child_names(&repo, &root).await, vec!["D"]);
}

#[tokio::test]
async fn test_check_out_without_content_copy() {
    let config = RepositoryConfig {
        content_copied_on_checkout: false,
        ..RepositoryConfig::default()
    };
    let repo = Repository::open(config).unwrap();
    let root = repo.root_folder_id().clone();
    let d = document(&repo, &root, "d").await;
    let out = repo.check_out(&d).await.unwrap();
    assert!(!out.content_copied);
    assert!(!repo.has_content_stream(&out.pwc_id).await.unwrap());
}

#[tokio::test]
async fn test_delete_tree_keeps_failed_object_intact() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let f = folder(&repo, &root, "F").await;
    let sub = folder(&repo, &f, "sub").await;
    let d1 = document(&repo, &f, "d1").await;
    let d2 = document(&repo, &sub, "d2").await;
    let outside = document(&repo, &root, "outside").await;
    let policy = repo
        .create_policy(CreatePolicy::new(Properties::typed("cmis:policy", "hold")).in_folder(&f))
        .await
        .unwrap();
    repo.apply_policy(&policy, &outside).await.unwrap();

    let outcome = repo
        .delete_tree(&f, Unfiling::DeleteSingleFiled, false)
        .await
        .unwrap();
    assert_eq!(outcome.failed, vec![policy.clone()]);

    for gone in [&d1, &d2, &sub] {
        let err = repo.get_object(gone, &Inclusion::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectNotFound);
    }
    let parents = repo.get_object_parents(&policy, &Inclusion::new()).await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, f);

    // retry after releasing the policy
    repo.remove_policy(&policy, &outside).await.unwrap();
    let retry = repo
        .delete_tree(&f, Unfiling::DeleteSingleFiled, false)
        .await
        .unwrap();
    assert!(retry.is_complete());
    assert_eq!(child_names(&repo, &root).await, vec!["outside"]);
}

#[tokio::test]
async fn test_delete_tree_reports_every_failure_when_continuing() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let f = folder(&repo, &root, "F").await;
    let outside = document(&repo, &root, "outside").await;
    let mut policies = Vec::new();
    for name in ["p1", "p2"] {
        let p = repo
            .create_policy(CreatePolicy::new(Properties::typed("cmis:policy", name)).in_folder(&f))
            .await
            .unwrap();
        repo.apply_policy(&p, &outside).await.unwrap();
        policies.push(p);
    }

    let outcome = repo.delete_tree(&f, Unfiling::Delete, true).await.unwrap();
    assert_eq!(outcome.failed.len(), 3);
    assert!(policies.iter().all(|p| outcome.failed.contains(p)));
    assert!(outcome.failed.contains(&f));
}

#[tokio::test]
async fn test_delete_tree_single_filed_unfiles_shared_documents() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let f = folder(&repo, &root, "F").await;
    let other = folder(&repo, &root, "other").await;
    let shared = document(&repo, &f, "shared").await;
    let local = document(&repo, &f, "local").await;
    repo.add_object_to_folder(&shared, &other).await.unwrap();

    let outcome = repo
        .delete_tree(&f, Unfiling::DeleteSingleFiled, true)
        .await
        .unwrap();
    assert!(outcome.is_complete());
    assert!(repo.get_object(&local, &Inclusion::new()).await.is_err());
    let parents = repo.get_object_parents(&shared, &Inclusion::new()).await.unwrap();
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id, other);
}

#[tokio::test]
async fn test_delete_tree_unfile_keeps_documents() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let f = folder(&repo, &root, "F").await;
    let d = document(&repo, &f, "d").await;

    let outcome = repo.delete_tree(&f, Unfiling::Unfile, false).await.unwrap();
    assert!(outcome.is_complete());
    assert!(repo.get_object(&d, &Inclusion::new()).await.is_ok());
    assert!(repo.get_object_parents(&d, &Inclusion::new()).await.unwrap().is_empty());
    assert!(repo.get_object(&f, &Inclusion::new()).await.is_err());
}

#[tokio::test]
async fn test_stale_change_token() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let d = document(&repo, &root, "d").await;
    let stale = repo.get_object(&d, &Inclusion::new()).await.unwrap().change_token;

    let fresh = repo
        .update_properties(
            &d,
            Some(stale),
            PropertyUpdates::new().set(cmis_props::NAME, Value::string("d-renamed")),
        )
        .await
        .unwrap();
    assert_ne!(fresh.change_token, stale);

    let err = repo
        .update_properties(
            &d,
            Some(stale),
            PropertyUpdates::new().set(cmis_props::NAME, Value::string("again")),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpdateConflict);
    assert!(err.to_string().contains(&stale.to_string()));

    let err = repo
        .set_content_stream(&d, ContentStream::new("x", "text/plain"), true, Some(stale))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpdateConflict);
}

#[tokio::test]
async fn test_delete_single_version_while_checked_out_conflicts() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let d = document(&repo, &root, "d").await;
    let out = repo.check_out(&d).await.unwrap();

    let err = repo.delete_object(&d, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpdateConflict);

    // deleting the working copy cancels the check-out
    repo.delete_object(&out.pwc_id, false).await.unwrap();
    repo.delete_object(&d, false).await.unwrap();
    assert!(child_names(&repo, &root).await.is_empty());
}

#[tokio::test]
async fn test_delete_current_version_restores_previous() {
    let repo = repo();
    let root = repo.root_folder_id().clone();
    let d = document(&repo, &root, "d").await;
    let out = repo.check_out(&d).await.unwrap();
    let d2 = repo.check_in(&out.pwc_id, CheckIn::minor()).await.unwrap();

    repo.delete_object(&d2, false).await.unwrap();
    let page = repo
        .get_children(&root, &Inclusion::new(), None, &Paging::default())
        .await
        .unwrap();
    assert_eq!(page.items[0].id, d);
    assert!(page.items[0].version.as_ref().unwrap().latest);
}
