//! End-to-end tests for loads against in-memory stores.

#[cfg(test)]
mod tests {
    use crate::config::LoaderConfig;
    use crate::context::{LoadContext, DEADLINE_EXCEEDED};
    use crate::core::{AttachmentId, Comment, CommentId, Session, StageName, UserId};
    use crate::errors::{LoadError, LoadErrorKind};
    use crate::events::{self, CollectingEventSink};
    use crate::testing::{
        scenario_comments, CommentReply, InMemoryAttachmentStore, InMemoryUserStore,
        ScriptedCommentStore, TestStores,
    };
    use crate::CommentsLoader;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn loader(stores: &TestStores) -> CommentsLoader {
        CommentsLoader::new(stores.stores()).unwrap()
    }

    fn loader_with(stores: &TestStores, config: LoaderConfig) -> CommentsLoader {
        CommentsLoader::with_config(stores.stores(), config).unwrap()
    }

    async fn wait_until_settled(loader: &CommentsLoader) {
        for _ in 0..100 {
            if !loader.gate_snapshot().in_flight {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("attempt still in flight");
    }

    #[tokio::test]
    async fn test_full_scenario() {
        let stores = TestStores::scenario();
        let data = loader(&stores).load(&LoadContext::background()).await.unwrap();

        assert_eq!(data.comments(), scenario_comments().as_slice());

        let users = data.users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[&UserId(101)].name, "ada");
        assert_eq!(users[&UserId(102)].name, "grace");
        assert_eq!(data.author(&data.comments()[1]).map(|u| u.id), Some(UserId(102)));

        let attachments = data.attachments().unwrap();
        assert_eq!(attachments.len(), 2);
        let first: Vec<_> = data.attachments_for(CommentId(1)).iter().map(|a| a.id).collect();
        let second: Vec<_> = data.attachments_for(CommentId(2)).iter().map(|a| a.id).collect();
        assert_eq!(first, vec![AttachmentId(1001)]);
        assert_eq!(second, vec![AttachmentId(1002)]);

        assert_eq!(data.session(), Some(&Session::new(UserId(101), "s1")));

        assert_eq!(stores.users.requests(), vec![vec![UserId(101), UserId(102)]]);
        assert_eq!(stores.attachments.requests(), vec![vec![CommentId(1), CommentId(2)]]);
    }

    #[tokio::test]
    async fn test_users_requested_once_per_author() {
        let stores = TestStores::with_comments(ScriptedCommentStore::new(vec![
            Comment::new(CommentId(1), UserId(101), "a"),
            Comment::new(CommentId(2), UserId(101), "b"),
            Comment::new(CommentId(3), UserId(102), "c"),
        ]));

        let data = loader(&stores).load(&LoadContext::background()).await.unwrap();

        assert_eq!(stores.users.requests(), vec![vec![UserId(101), UserId(102)]]);
        assert_eq!(data.users().map(|u| u.len()), Some(2));
    }

    #[tokio::test]
    async fn test_unknown_authors_are_absent() {
        let stores = TestStores::scenario().with_users(InMemoryUserStore::new(Vec::new()));
        let data = loader(&stores).load(&LoadContext::background()).await.unwrap();

        let users = data.users().unwrap();
        assert!(users.is_empty());
        assert!(data.author(&data.comments()[0]).is_none());
    }

    #[tokio::test]
    async fn test_no_comments_skips_lookups() {
        let stores = TestStores::with_comments(ScriptedCommentStore::new(Vec::new()));
        let data = loader(&stores).load(&LoadContext::background()).await.unwrap();

        assert!(data.comments().is_empty());
        assert!(data.users().is_none());
        assert!(data.attachments().is_none());
        assert_eq!(stores.users.call_count(), 0);
        assert_eq!(stores.attachments.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_session_id_skips_attachments() {
        let stores = TestStores::scenario().with_session(Some(Session::new(UserId(101), "")));
        let data = loader(&stores).load(&LoadContext::background()).await.unwrap();

        assert!(data.attachments().is_none());
        assert!(data.attachments_for(CommentId(1)).is_empty());
        assert_eq!(data.users().map(|u| u.len()), Some(2));
        assert_eq!(stores.attachments.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_session_skips_attachments() {
        let stores = TestStores::scenario().with_session(None);
        let data = loader(&stores).load(&LoadContext::background()).await.unwrap();

        assert!(data.session().is_none());
        assert!(data.attachments().is_none());
        assert_eq!(stores.attachments.call_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_then_retry_succeeds() {
        let stores = TestStores::with_comments(
            ScriptedCommentStore::new(scenario_comments())
                .then(CommentReply::Fail("db down".to_string())),
        );
        let loader = loader(&stores);
        let ctx = LoadContext::background();

        let err = loader.load(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::StoreFailure);
        assert_eq!(err.stage(), Some(StageName::Comments));
        assert!(err.to_string().contains("db down"));
        assert_eq!(stores.users.call_count(), 0);
        assert_eq!(loader.gate_snapshot().remaining_attempts, 2);

        let data = loader.load(&ctx).await.unwrap();
        assert_eq!(data.comments().len(), 2);
        assert_eq!(stores.comments.call_count(), 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let stores = TestStores::scenario().with_users(InMemoryUserStore::new(Vec::new()).panicking("boom"));
        let err = loader(&stores)
            .load(&LoadContext::background())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), LoadErrorKind::PanicDuringLoad);
        assert_eq!(err.stage(), Some(StageName::Users));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_success_is_cached() {
        let stores = TestStores::scenario();
        let loader = loader(&stores);
        let ctx = LoadContext::background();

        let first = loader.load(&ctx).await.unwrap();
        let second = loader.load(&ctx).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(stores.comments.call_count(), 1);
        assert_eq!(stores.session.call_count(), 1);
        assert_eq!(stores.users.call_count(), 1);
        assert_eq!(stores.attachments.call_count(), 1);

        let snapshot = loader.gate_snapshot();
        assert!(snapshot.loaded);
        assert_eq!(snapshot.generation, 1);
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let stores = TestStores::with_comments(ScriptedCommentStore::failing("db down"));
        let loader = loader(&stores);
        let ctx = LoadContext::background();

        for _ in 0..3 {
            let err = loader.load(&ctx).await.unwrap_err();
            assert_eq!(err.kind(), LoadErrorKind::StoreFailure);
        }

        let err = loader.load(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::AttemptsExhausted);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("db down"));
        match &err {
            LoadError::AttemptsExhausted { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert_eq!(last.kind(), LoadErrorKind::StoreFailure);
            }
            other => panic!("unexpected error: {other}"),
        }

        let _ = loader.load(&ctx).await;
        assert_eq!(stores.comments.call_count(), 3);
        assert_eq!(loader.gate_snapshot().remaining_attempts, 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_attempt() {
        let stores = TestStores::with_comments(
            ScriptedCommentStore::new(scenario_comments()).with_delay(Duration::from_millis(30)),
        );
        let loader = loader(&stores);

        let calls = (0..5).map(|_| {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load(&LoadContext::background()).await })
        });
        let results = futures::future::join_all(calls).await;

        for result in results {
            assert_eq!(result.unwrap().unwrap().comments().len(), 2);
        }
        assert_eq!(stores.comments.call_count(), 1);
        assert_eq!(stores.users.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let stores = TestStores::with_comments(
            ScriptedCommentStore::failing("db down").with_delay(Duration::from_millis(20)),
        );
        let loader = loader(&stores);
        let ctx = LoadContext::background();

        let (a, b) = tokio::join!(loader.load(&ctx), loader.load(&ctx));

        assert!(a.unwrap_err().to_string().contains("db down"));
        assert!(b.unwrap_err().to_string().contains("db down"));
        assert_eq!(stores.comments.call_count(), 1);
        assert_eq!(loader.gate_snapshot().remaining_attempts, 2);
    }

    #[tokio::test]
    async fn test_caller_cancellation() {
        let stores = TestStores::with_comments(
            ScriptedCommentStore::new(scenario_comments()).with_delay(Duration::from_millis(200)),
        );
        let loader = loader_with(&stores, LoaderConfig::default().with_drain_timeout_ms(10));

        let (ctx, token) = LoadContext::cancellable();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel("caller gave up");
        });

        let err = loader.load(&ctx).await.unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err.kind(), LoadErrorKind::Cancelled);
        assert!(err.to_string().contains("caller gave up"));
        assert_eq!(stores.users.call_count(), 0);

        wait_until_settled(&loader).await;
        assert_eq!(loader.gate_snapshot().remaining_attempts, 2);
    }

    #[tokio::test]
    async fn test_caller_deadline() {
        let stores = TestStores::with_comments(
            ScriptedCommentStore::new(scenario_comments()).with_delay(Duration::from_millis(200)),
        );
        let loader = loader_with(&stores, LoaderConfig::default().with_drain_timeout_ms(10));
        let ctx = LoadContext::background().with_timeout(Duration::from_millis(20));

        let err = loader.load(&ctx).await.unwrap_err();

        assert_eq!(err.kind(), LoadErrorKind::Cancelled);
        assert!(err.to_string().contains(DEADLINE_EXCEEDED));
    }

    #[tokio::test]
    async fn test_attempt_timeout_consumes_budget() {
        let stores = TestStores::with_comments(
            ScriptedCommentStore::new(scenario_comments()).with_delay(Duration::from_millis(200)),
        );
        let config = LoaderConfig::default()
            .with_attempt_timeout_ms(20)
            .with_drain_timeout_ms(10);
        let loader = loader_with(&stores, config);

        let err = loader.load(&LoadContext::background()).await.unwrap_err();

        assert_eq!(err.kind(), LoadErrorKind::Cancelled);
        assert!(err.to_string().contains(DEADLINE_EXCEEDED));
        assert_eq!(loader.gate_snapshot().remaining_attempts, 2);
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let stores = TestStores::scenario()
            .with_users(InMemoryUserStore::new(Vec::new()).panicking("boom"))
            .with_attachments(
                InMemoryAttachmentStore::new(Vec::new()).with_delay(Duration::from_millis(100)),
            );
        let sink = Arc::new(CollectingEventSink::new());
        let loader = CommentsLoader::builder(stores.stores())
            .event_sink(sink.clone())
            .build()
            .unwrap();

        let err = loader.load(&LoadContext::background()).await.unwrap_err();

        assert_eq!(err.stage(), Some(StageName::Users));
        assert_eq!(sink.events_of_type(events::STAGE_FAILED).len(), 1);
        assert!(sink.position(events::STAGE_ABORTED, "attachments").is_some());
        assert!(sink.position(events::STAGE_COMPLETED, "attachments").is_none());
    }

    #[tokio::test]
    async fn test_stage_ordering() {
        let stores = TestStores::scenario();
        let sink = Arc::new(CollectingEventSink::new());
        let loader = CommentsLoader::builder(stores.stores())
            .event_sink(sink.clone())
            .build()
            .unwrap();

        loader.load(&LoadContext::background()).await.unwrap();

        let comments_done = sink.position(events::STAGE_COMPLETED, "comments").unwrap();
        let session_done = sink.position(events::STAGE_COMPLETED, "session").unwrap();
        let users_started = sink.position(events::STAGE_STARTED, "users").unwrap();
        let attachments_started = sink.position(events::STAGE_STARTED, "attachments").unwrap();

        assert!(comments_done < users_started);
        assert!(comments_done < attachments_started);
        assert!(session_done < attachments_started);
        assert_eq!(sink.events_of_type(events::ATTEMPT_COMPLETED).len(), 1);
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        let stores = TestStores::scenario();
        let err = CommentsLoader::builder(stores.stores())
            .config(LoaderConfig::default().with_max_attempts(0))
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("invalid loader configuration"));
    }
}
