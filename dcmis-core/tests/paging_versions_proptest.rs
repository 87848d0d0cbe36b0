//! Property tests for stable paging and version ordering

use dcmis_core::{
    CheckIn, CreateDocument, Inclusion, ObjectId, Paging, Properties, Repository,
    RepositoryConfig,
};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn populated(count: usize) -> (Repository, ObjectId) {
    let repo = Repository::open(RepositoryConfig::default()).unwrap();
    let root = repo.root_folder_id().clone();
    for i in 0..count {
        let name = format!("doc-{:03}", (i * 7) % 101);
        repo.create_document(
            CreateDocument::new(Properties::typed("cmis:document", name)).in_folder(&root),
        )
        .await
        .unwrap();
    }
    (repo, root)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_children_paging_is_stable(
        count in 0usize..25,
        max_items in 0usize..8,
        skip in 0usize..30,
        order_by in prop::option::of(prop::sample::select(vec![
            "cmis:name",
            "cmis:name DESC",
            "cmis:creationDate",
        ])),
    ) {
        runtime().block_on(async {
            let (repo, root) = populated(count).await;
            let paging = Paging::new(max_items, skip);
            let first = repo
                .get_children(&root, &Inclusion::new(), order_by, &paging)
                .await
                .unwrap();
            let second = repo
                .get_children(&root, &Inclusion::new(), order_by, &paging)
                .await
                .unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.has_more_items, skip + first.len() < count);
            Ok(())
        })?;
    }

    #[test]
    fn prop_pages_concatenate_to_full_listing(count in 0usize..25, max_items in 1usize..6) {
        runtime().block_on(async {
            let (repo, root) = populated(count).await;
            let full = repo
                .get_children(&root, &Inclusion::new(), None, &Paging::new(count.max(1), 0))
                .await
                .unwrap();

            let mut collected = Vec::new();
            let mut paging = Paging::new(max_items, 0);
            loop {
                let page = repo
                    .get_children(&root, &Inclusion::new(), None, &paging)
                    .await
                    .unwrap();
                paging = paging.next(&page);
                let more = page.has_more_items;
                collected.extend(page.items.into_iter().map(|e| e.id));
                if !more {
                    break;
                }
            }
            let expected: Vec<ObjectId> = full.items.into_iter().map(|e| e.id).collect();
            prop_assert_eq!(collected, expected);
            Ok(())
        })?;
    }

    #[test]
    fn prop_all_versions_newest_first(
        majors in prop::collection::vec(any::<bool>(), 0..6),
        keep_checked_out in any::<bool>(),
    ) {
        runtime().block_on(async {
            let repo = Repository::open(RepositoryConfig::default()).unwrap();
            let root = repo.root_folder_id().clone();
            let mut current = repo
                .create_document(
                    CreateDocument::new(Properties::typed("cmis:document", "d")).in_folder(&root),
                )
                .await
                .unwrap();
            let series = repo
                .get_object(&current, &Inclusion::new())
                .await
                .unwrap()
                .series_id()
                .cloned()
                .unwrap();

            let mut expected_labels = vec!["1.0".to_string()];
            let (mut maj, mut min) = (1u32, 0u32);
            for major in &majors {
                let pwc = repo.check_out(&current).await.unwrap().pwc_id;
                let request = if *major { CheckIn::major() } else { CheckIn::minor() };
                current = repo.check_in(&pwc, request).await.unwrap();
                if *major {
                    maj += 1;
                    min = 0;
                } else {
                    min += 1;
                }
                expected_labels.push(format!("{}.{}", maj, min));
            }
            if keep_checked_out {
                repo.check_out(&current).await.unwrap();
                expected_labels.push(dcmis_core::PWC_LABEL.to_string());
            }
            expected_labels.reverse();

            let versions = repo.get_all_versions(&series, &Inclusion::new()).await.unwrap();
            let labels: Vec<String> = versions
                .iter()
                .map(|v| v.version.as_ref().unwrap().label.clone())
                .collect();
            prop_assert_eq!(labels, expected_labels);
            prop_assert!(versions.iter().filter(|v| v.is_private_working_copy()).count() <= 1);
            Ok(())
        })?;
    }
}
