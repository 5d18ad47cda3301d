//! 作用域重建与事件投递的端到端测试

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tether_common::{ComponentKind, Key, RuntimeError, ScopeName, ScopeState, StateError};
use tether_composition::{RuntimeBuilder, TetherRuntime};
use tether_graph::ReleaseOutcome;
use tether_mvc::{
    component_provider, model_key, model_key_of, model_provider, Component, ComponentBase,
    DispatchContext, Event, EventChannel, EventSender, StateCell,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct NoteModel {
    title: String,
    content: String,
}

#[derive(Debug, Clone, PartialEq)]
enum NoteEvent {
    TitleChanged(String),
    ContentAppended(usize),
}

struct NoteController {
    base: ComponentBase<NoteModel, NoteEvent>,
    restored: AtomicUsize,
}

impl NoteController {
    fn set_title(&self, title: &str) {
        self.base.model().write().title = title.to_string();
        self.base.post(NoteEvent::TitleChanged(title.to_string()));
    }

    fn append(&self, text: &str) {
        let length = self.base.model().update(|model| {
            model.content.push_str(text);
            model.content.len()
        });
        self.base.post(NoteEvent::ContentAppended(length));
    }
}

impl Component for NoteController {
    type Model = NoteModel;
    type Event = NoteEvent;
    const KIND: ComponentKind = ComponentKind::Controller;

    fn model_key(&self) -> Key {
        self.base.model_key().clone()
    }

    fn model(&self) -> &StateCell<NoteModel> {
        self.base.model()
    }

    fn events(&self) -> &EventChannel<NoteEvent> {
        self.base.events()
    }

    fn on_restored(&self) {
        self.restored.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SyncState {
    pending: u32,
}

struct SyncManager {
    base: ComponentBase<SyncState, u32>,
    released: Arc<AtomicUsize>,
}

impl SyncManager {
    fn enqueue(&self) {
        let pending = self.base.model().update(|state| {
            state.pending += 1;
            state.pending
        });
        self.base.post(pending);
    }
}

impl Component for SyncManager {
    type Model = SyncState;
    type Event = u32;
    const KIND: ComponentKind = ComponentKind::Manager;

    fn model_key(&self) -> Key {
        self.base.model_key().clone()
    }

    fn model(&self) -> &StateCell<SyncState> {
        self.base.model()
    }

    fn events(&self) -> &EventChannel<u32> {
        self.base.events()
    }

    fn on_released(&self) {
        if self.base.mark_released() {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn note_model_key() -> Key {
    model_key::<NoteModel>(Some("note"))
}

fn build(released: Arc<AtomicUsize>) -> anyhow::Result<TetherRuntime> {
    let tether = RuntimeBuilder::new()
        .register(model_provider::<NoteModel>(Some("note")))?
        .register(component_provider::<NoteController, _>(
            note_model_key(),
            |model, _| {
                Ok(NoteController {
                    base: ComponentBase::new(
                        EventSender::of::<NoteController>(),
                        note_model_key(),
                        model,
                    ),
                    restored: AtomicUsize::new(0),
                })
            },
        ))?
        .register(model_provider::<SyncState>(None).in_scope("activity"))?
        .register(
            component_provider::<SyncManager, _>(model_key_of::<SyncManager>(None), move |model, _| {
                Ok(SyncManager {
                    base: ComponentBase::new(
                        EventSender::of::<SyncManager>(),
                        model_key_of::<SyncManager>(None),
                        model,
                    ),
                    released: released.clone(),
                })
            })
            .in_scope("activity"),
        )?
        .build()?;
    Ok(tether)
}

/// 模型在为重建而销毁作用域后恢复，事件投递到新组件的监听器
#[tokio::test]
async fn test_note_survives_recreation() {
    let tether = build(Arc::new(AtomicUsize::new(0))).unwrap();
    let runtime = tether.runtime();
    let editor = ScopeName::new("editor");
    runtime.on_scope_create(editor.clone(), None).unwrap();

    let controller = runtime
        .resolve::<NoteController>(&editor, &Key::of::<NoteController>())
        .await
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    controller
        .events()
        .register(move |event: &Event<NoteEvent>| sink.lock().push(event.payload().clone()));

    controller.set_title("groceries");
    controller.append("milk");
    assert_eq!(
        *seen.lock(),
        vec![
            NoteEvent::TitleChanged("groceries".into()),
            NoteEvent::ContentAppended(4)
        ]
    );

    assert_eq!(runtime.on_scope_will_destroy(&editor, true).unwrap(), 1);
    assert_eq!(
        runtime.scope_state(&editor),
        Some(ScopeState::WillDestroy {
            for_recreation: true
        })
    );
    assert!(runtime.state_keeper().contains(&note_model_key()));
    runtime.on_scope_destroyed(&editor).await.unwrap();
    assert!(controller.is_released());

    runtime.on_scope_create(editor.clone(), None).unwrap();
    let recreated = runtime
        .resolve::<NoteController>(&editor, &Key::of::<NoteController>())
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(controller.component(), recreated.component()));
    assert_eq!(
        recreated.model().snapshot(),
        NoteModel {
            title: "groceries".into(),
            content: "milk".into(),
        }
    );
    assert_eq!(recreated.restored.load(Ordering::SeqCst), 1);
    assert!(runtime.state_keeper().is_empty());

    recreated.append(" and eggs");
    assert_eq!(seen.lock().len(), 2);

    let report = tether.shutdown().await.unwrap();
    assert_eq!(report.states_discarded, 0);
}

/// 声明在外层作用域的管理器比内层作用域活得久
#[tokio::test]
async fn test_manager_outlives_inner_scope() {
    let released = Arc::new(AtomicUsize::new(0));
    let tether = build(released.clone()).unwrap();
    let runtime = tether.runtime();
    let activity = ScopeName::new("activity");
    let fragment = ScopeName::new("fragment");
    runtime.on_scope_create(activity.clone(), None).unwrap();
    let chain = runtime.on_scope_create(fragment.clone(), Some(&activity)).unwrap();
    assert_eq!(chain.to_string(), "[root > activity > fragment]");

    let manager = runtime
        .resolve::<SyncManager>(&fragment, &Key::of::<SyncManager>())
        .await
        .unwrap();
    assert_eq!(manager.scope(), &activity);
    manager.enqueue();

    runtime.on_scope_will_destroy(&fragment, false).unwrap();
    runtime.on_scope_destroyed(&fragment).await.unwrap();
    assert!(!manager.is_released());
    assert_eq!(released.load(Ordering::SeqCst), 0);

    runtime.on_scope_will_destroy(&activity, false).unwrap();
    runtime.on_scope_destroyed(&activity).await.unwrap();
    assert!(manager.is_released());
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(manager.release().await.unwrap(), ReleaseOutcome::NotHeld);
}

/// 后台发布的事件在监听器所在的分发上下文上按顺序投递
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_posts_are_marshaled_to_ui_context() {
    let tether = build(Arc::new(AtomicUsize::new(0))).unwrap();
    let runtime = tether.runtime();
    let activity = ScopeName::new("activity");
    runtime.on_scope_create(activity.clone(), None).unwrap();

    let manager = runtime
        .resolve::<SyncManager>(&activity, &Key::of::<SyncManager>())
        .await
        .unwrap();

    let ui = DispatchContext::spawn("ui");
    let handle = ui.handle();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.events().register_on(
        move |event: &Event<u32>| sink.lock().push((*event.payload(), handle.is_current())),
        &ui,
    );

    let background = manager.component().clone();
    tokio::task::spawn_blocking(move || {
        for _ in 0..3 {
            background.enqueue();
        }
    })
    .await
    .unwrap();

    assert!(ui.flush().await);
    assert_eq!(*seen.lock(), vec![(1, true), (2, true), (3, true)]);
    ui.shutdown().await;
}

/// 即将销毁的作用域不再接受解析
#[tokio::test]
async fn test_resolve_in_destroying_scope_is_rejected() {
    let tether = build(Arc::new(AtomicUsize::new(0))).unwrap();
    let runtime = tether.runtime();
    let editor = ScopeName::new("editor");
    runtime.on_scope_create(editor.clone(), None).unwrap();
    runtime.on_scope_will_destroy(&editor, true).unwrap();

    let err = runtime
        .resolve::<NoteController>(&editor, &Key::of::<NoteController>())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ScopeNotActive { .. }));

    let err = runtime
        .on_scope_create("dialog", Some(&editor))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ScopeNotActive { .. }));
}

/// 无法反序列化的保存状态使解析失败，并归还已获取的组件
#[tokio::test]
async fn test_corrupt_saved_state_fails_resolution() {
    let tether = build(Arc::new(AtomicUsize::new(0))).unwrap();
    let runtime = tether.runtime();
    let editor = ScopeName::new("editor");
    runtime.on_scope_create(editor.clone(), None).unwrap();
    runtime
        .state_keeper()
        .save(note_model_key(), &42_u32)
        .unwrap();

    let err = runtime
        .resolve::<NoteController>(&editor, &Key::of::<NoteController>())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::State {
            source: StateError::Deserialize { .. }
        }
    ));

    let cache = tether.graph().scope(&editor).unwrap();
    assert!(cache.is_empty().await);
}
