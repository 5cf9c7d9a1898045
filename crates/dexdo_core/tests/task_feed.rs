use dexdo_core::{
    FeedError, SnapshotSender, SqliteTaskStore, StoreError, StoreResult, Subscription, Task,
    TaskFeed, TaskId, TaskPatch, TaskStore, TaskViews,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

async fn wait_for(
    rx: &mut watch::Receiver<TaskViews>,
    predicate: impl Fn(&TaskViews) -> bool,
) -> TaskViews {
    timeout(Duration::from_secs(2), async {
        loop {
            {
                let views = rx.borrow_and_update();
                if predicate(&views) {
                    return views.clone();
                }
            }
            rx.changed().await.expect("feed should stay alive");
        }
    })
    .await
    .expect("views should reach the expected state in time")
}

fn assert_partition(views: &TaskViews) {
    let pending: HashSet<_> = views.pending.iter().map(|task| task.id.clone()).collect();
    let completed: HashSet<_> = views.completed.iter().map(|task| task.id.clone()).collect();
    let all: HashSet<_> = views.tasks.iter().map(|task| task.id.clone()).collect();
    assert!(pending.is_disjoint(&completed));
    assert_eq!(pending.union(&completed).cloned().collect::<HashSet<_>>(), all);
    assert!(views.pending.iter().all(|task| !task.completed));
    assert!(views.completed.iter().all(|task| task.completed));
}

#[tokio::test]
async fn snapshots_are_partitioned_into_pending_and_completed() {
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    let first = store.add("alice", &Task::new("walk dog", "2026/10/20")).unwrap();
    store.add("alice", &Task::new("buy milk", "")).unwrap();

    let feed = TaskFeed::new(store.clone(), Handle::current());
    let mut rx = feed.subscribe();
    feed.bind_user(Some("alice")).unwrap();

    let views = wait_for(&mut rx, |views| views.tasks.len() == 2).await;
    assert_partition(&views);
    assert_eq!(views.pending.len(), 2);

    feed.set_completed(&first, true).unwrap();
    let views = wait_for(&mut rx, |views| views.completed.len() == 1).await;
    assert_partition(&views);
    assert_eq!(views.completed[0].id, first);
    assert_eq!(views.pending.len(), 1);
}

#[tokio::test]
async fn rebinding_switches_user_and_keeps_one_listener() {
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    store.add("alice", &Task::new("alice task", "")).unwrap();
    store.add("bob", &Task::new("bob task", "")).unwrap();

    let feed = TaskFeed::new(store.clone(), Handle::current());
    let mut rx = feed.subscribe();
    feed.bind_user(Some("alice")).unwrap();
    wait_for(&mut rx, |views| views.tasks.len() == 1).await;

    feed.bind_user(Some("bob")).unwrap();
    let views = wait_for(&mut rx, |views| {
        views.user_id.as_deref() == Some("bob") && views.tasks.len() == 1
    })
    .await;
    assert_eq!(views.tasks[0].text, "bob task");

    timeout(Duration::from_secs(2), async {
        while store.listener_count() != 1 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("old listener should be torn down");

    store.add("alice", &Task::new("late alice write", "")).unwrap();
    sleep(Duration::from_millis(50)).await;
    assert!(feed.views().tasks.iter().all(|task| task.text == "bob task"));
}

#[tokio::test]
async fn unbinding_clears_views_and_rejects_writes() {
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap());
    store.add("alice", &Task::new("walk dog", "")).unwrap();

    let feed = TaskFeed::new(store.clone(), Handle::current());
    let mut rx = feed.subscribe();
    feed.bind_user(Some("alice")).unwrap();
    wait_for(&mut rx, |views| views.tasks.len() == 1).await;

    feed.bind_user(None).unwrap();
    let views = wait_for(&mut rx, |views| views.user_id.is_none()).await;
    assert!(views.tasks.is_empty());
    assert!(feed.current_user().is_none());
    assert!(matches!(
        feed.add(&Task::new("orphan", "")),
        Err(FeedError::NoActiveSession)
    ));
}

#[tokio::test]
async fn clear_deletes_everything_in_limited_batches() {
    let store = Arc::new(SqliteTaskStore::open_in_memory().unwrap().with_batch_limit(2));
    for index in 0..5 {
        store.add("alice", &Task::new(format!("task {index}"), "")).unwrap();
    }

    let feed = TaskFeed::new(store.clone(), Handle::current());
    let mut rx = feed.subscribe();
    feed.bind_user(Some("alice")).unwrap();
    wait_for(&mut rx, |views| views.tasks.len() == 5).await;

    assert_eq!(feed.clear().unwrap(), 5);
    wait_for(&mut rx, |views| views.tasks.is_empty()).await;
    assert!(store.query_ordered("alice").unwrap().is_empty());
}

/// Store whose listener is driven by the test.
#[derive(Default)]
struct ScriptedStore {
    sender: Mutex<Option<SnapshotSender>>,
    added: Mutex<Vec<Task>>,
}

impl ScriptedStore {
    fn push(&self, event: StoreResult<Vec<Task>>) {
        let sender = self.sender.lock().unwrap();
        sender
            .as_ref()
            .expect("listener should be open")
            .send(event)
            .expect("feed should be listening");
    }
}

impl TaskStore for ScriptedStore {
    fn add(&self, _user_id: &str, task: &Task) -> StoreResult<TaskId> {
        self.added.lock().unwrap().push(task.clone());
        Ok("scripted-1".to_string())
    }

    fn set(&self, _user_id: &str, _task: &Task) -> StoreResult<()> {
        Ok(())
    }

    fn update_fields(&self, _user_id: &str, _id: &str, _patch: &TaskPatch) -> StoreResult<()> {
        Ok(())
    }

    fn delete(&self, _user_id: &str, _id: &str) -> StoreResult<()> {
        Ok(())
    }

    fn batch_delete(&self, _user_id: &str, _ids: &[TaskId]) -> StoreResult<()> {
        Ok(())
    }

    fn get(&self, _user_id: &str, _id: &str) -> StoreResult<Option<Task>> {
        Ok(None)
    }

    fn query_ordered(&self, _user_id: &str) -> StoreResult<Vec<Task>> {
        Ok(Vec::new())
    }

    fn listen(&self, _user_id: &str) -> StoreResult<Subscription> {
        let (sender, receiver) = unbounded_channel();
        *self.sender.lock().unwrap() = Some(sender);
        Ok(Subscription::from_receiver(receiver))
    }
}

fn persisted(id: &str, text: &str) -> Task {
    let mut task = Task::new(text, "");
    task.id = id.to_string();
    task
}

#[tokio::test]
async fn listener_error_keeps_last_good_views() {
    let store = Arc::new(ScriptedStore::default());
    let feed = TaskFeed::new(store.clone(), Handle::current());
    let mut rx = feed.subscribe();
    feed.bind_user(Some("alice")).unwrap();

    store.push(Ok(vec![persisted("a", "walk dog")]));
    wait_for(&mut rx, |views| views.tasks.len() == 1).await;

    store.push(Err(StoreError::Listener("permission denied".to_string())));
    sleep(Duration::from_millis(50)).await;
    let views = feed.views();
    assert_eq!(views.tasks.len(), 1);
    assert_eq!(views.tasks[0].id, "a");

    store.push(Ok(vec![persisted("a", "walk dog"), persisted("b", "buy milk")]));
    let views = wait_for(&mut rx, |views| views.tasks.len() == 2).await;
    assert_partition(&views);
}

#[tokio::test]
async fn writes_do_not_touch_cached_views() {
    let store = Arc::new(ScriptedStore::default());
    let feed = TaskFeed::new(store.clone(), Handle::current());
    let mut rx = feed.subscribe();
    feed.bind_user(Some("alice")).unwrap();
    store.push(Ok(Vec::new()));
    wait_for(&mut rx, |views| views.user_id.as_deref() == Some("alice")).await;

    let id = feed.add(&Task::new("walk dog", "")).unwrap();
    assert_eq!(id, "scripted-1");
    assert_eq!(store.added.lock().unwrap().len(), 1);
    assert!(feed.views().tasks.is_empty());
}
