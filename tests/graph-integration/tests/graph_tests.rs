//! 对象图跨 crate 集成测试

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tether_common::{BoxError, Disposable, GraphError, Key, ScopeChain, ScopeName};
use tether_graph::{
    CacheStore, Graph, Provider, ProviderRegistry, ProviderSet, ReleaseOutcome,
    ResolvedDependencies, Resolver, ResolverExt,
};
use tether_graph_abstractions::GraphModule;

#[derive(Debug, Default)]
struct NoteModel {
    title: parking_lot::Mutex<String>,
    content: parking_lot::Mutex<String>,
}

#[derive(Debug)]
struct Session {
    id: usize,
}

#[derive(Debug)]
struct NoteRepository {
    session: Arc<Session>,
    disposed: Arc<AtomicUsize>,
}

impl Disposable for NoteRepository {
    fn dispose(&self) -> Result<(), BoxError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn note_key() -> Key {
    Key::qualified::<NoteModel>("note")
}

/// 同一作用域内两次解析得到同一实例，两次释放后移出缓存
#[tokio::test]
async fn test_note_model_scenario() {
    let mut registry = ProviderRegistry::new();
    registry
        .register(Provider::default_of::<NoteModel>().qualified("note"))
        .unwrap();
    let graph = Graph::with_registry(registry);
    let screen = ScopeName::new("screen");
    graph.create_scope(screen.clone());
    let chain = ScopeChain::root().child(screen.clone());

    let first = graph.resolve::<NoteModel>(&note_key(), &chain).await.unwrap();
    let second = graph.resolve::<NoteModel>(&note_key(), &chain).await.unwrap();
    assert_eq!(first.scope, screen);
    assert!(Arc::ptr_eq(&first.value, &second.value));
    assert!(first.value.content.lock().is_empty());

    *first.value.title.lock() = "groceries".to_string();

    let cache = graph.scope(&screen).unwrap();
    assert_eq!(cache.ref_count(&note_key()).await, Some(2));
    assert_eq!(
        graph.release(&note_key(), &screen).await.unwrap(),
        ReleaseOutcome::Retained { remaining: 1 }
    );
    assert_eq!(second.value.title.lock().as_str(), "groceries");
    assert_eq!(
        graph.release(&note_key(), &screen).await.unwrap(),
        ReleaseOutcome::Disposed
    );
    assert!(cache.is_empty().await);
    assert_eq!(
        graph.release(&note_key(), &screen).await.unwrap(),
        ReleaseOutcome::NotHeld
    );
}

/// 并发解析只构造一次
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolve_constructs_once() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();

    let mut registry = ProviderRegistry::new();
    registry
        .register(Provider::from_fn(move || Session {
            id: counter.fetch_add(1, Ordering::SeqCst),
        }))
        .unwrap();
    let graph = Arc::new(Graph::with_registry(registry));

    let tasks = (0..64).map(|_| {
        let graph = graph.clone();
        tokio::spawn(async move {
            graph
                .resolve::<Session>(&Key::of::<Session>(), &ScopeChain::root())
                .await
                .map(|resolved| resolved.value.id)
        })
    });
    let ids: Vec<usize> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert!(ids.iter().all(|id| *id == 0));
    let root = graph.scope(&ScopeName::root()).unwrap();
    assert_eq!(root.ref_count(&Key::of::<Session>()).await, Some(64));
}

#[derive(Debug)]
struct Node;

fn ring(length: usize) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for i in 0..length {
        let next = Key::qualified::<Node>(((i + 1) % length).to_string());
        registry
            .register(
                Provider::of(|_: &ResolvedDependencies| Ok(Node))
                    .qualified(i.to_string())
                    .depends_on(next),
            )
            .unwrap();
    }
    registry
}

/// 任意深度的循环依赖都被检测出来，不会栈溢出
#[tokio::test]
async fn test_deep_cycle_is_detected() {
    let graph = Graph::with_registry(ring(20_000));

    let err = graph
        .resolve::<Node>(&Key::qualified::<Node>("0"), &ScopeChain::root())
        .await
        .unwrap_err();
    match err {
        GraphError::CyclicDependency { chain } => assert!(chain.contains("Node@19999")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(graph.stats().constructions, 0);
}

/// 劫持期间解析到替身，结束劫持后解析到原实例
#[tokio::test]
async fn test_hijack_round_trip_is_observationally_identical() {
    let mut registry = ProviderRegistry::new();
    registry
        .register(Provider::from_fn(|| Session { id: 1 }))
        .unwrap();
    let graph = Graph::with_registry(registry);
    let root = ScopeName::root();
    let chain = ScopeChain::root();
    let key = Key::of::<Session>();

    let original = graph.resolve::<Session>(&key, &chain).await.unwrap();

    let fake = Arc::new(Session { id: 99 });
    let token = graph
        .hijack(&root, CacheStore::new().with_instance(key.clone(), fake.clone()))
        .unwrap();
    assert!(matches!(
        graph.hijack(&root, CacheStore::new()),
        Err(GraphError::DoubleHijack { .. })
    ));

    let during = graph.resolve::<Session>(&key, &chain).await.unwrap();
    assert!(Arc::ptr_eq(&during.value, &fake));

    let replacement = graph.unhijack(token).unwrap();
    assert_eq!(replacement.ref_count(&key).await, Some(2));

    let after = graph.resolve::<Session>(&key, &chain).await.unwrap();
    assert!(Arc::ptr_eq(&after.value, &original.value));
    assert_eq!(after.value.id, 1);
    assert_eq!(
        graph.scope(&root).unwrap().ref_count(&key).await,
        Some(2)
    );
}

/// 可覆盖的绑定被测试替身替换
#[tokio::test]
async fn test_overridable_binding_is_replaced() {
    let mut registry = ProviderRegistry::new();
    registry
        .register(Provider::from_fn(|| Session { id: 1 }).overridable())
        .unwrap();
    registry
        .register(Provider::from_fn(|| Session { id: 2 }))
        .unwrap();
    assert!(matches!(
        registry.register(Provider::from_fn(|| Session { id: 3 })),
        Err(GraphError::DuplicateBinding { .. })
    ));

    let graph = Graph::with_registry(registry);
    let session = graph
        .resolve::<Session>(&Key::of::<Session>(), &ScopeChain::root())
        .await
        .unwrap();
    assert_eq!(session.value.id, 2);
}

struct RepositoryModule {
    disposed: Arc<AtomicUsize>,
}

impl GraphModule for RepositoryModule {
    fn name(&self) -> &str {
        "repository"
    }

    fn providers(&self) -> Vec<Provider> {
        let disposed = self.disposed.clone();
        let set = ProviderSet::new("repository")
            .with(Provider::from_fn(|| Session { id: 7 }).in_scope(ScopeName::root()))
            .with(
                Provider::of(move |deps: &ResolvedDependencies| {
                    Ok(NoteRepository {
                        session: deps.get_of::<Session>()?,
                        disposed: disposed.clone(),
                    })
                })
                .depends_on(Key::of::<Session>())
                .disposable(),
            );
        set.providers()
    }
}

/// 释放内层作用域中的实例时级联释放外层作用域中的依赖
#[tokio::test]
async fn test_release_cascades_across_scopes() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let mut registry = ProviderRegistry::new();
    registry
        .register_module(&RepositoryModule {
            disposed: disposed.clone(),
        })
        .unwrap();
    let graph = Graph::with_registry(registry);

    let screen = ScopeName::new("screen");
    graph.create_scope(screen.clone());
    let chain = ScopeChain::root().child(screen.clone());

    let repository = graph
        .resolve::<NoteRepository>(&Key::of::<NoteRepository>(), &chain)
        .await
        .unwrap();
    assert_eq!(repository.scope, screen);
    assert_eq!(repository.value.session.id, 7);

    let root = graph.scope(&ScopeName::root()).unwrap();
    assert_eq!(root.ref_count(&Key::of::<Session>()).await, Some(1));

    assert_eq!(
        graph
            .release(&Key::of::<NoteRepository>(), &screen)
            .await
            .unwrap(),
        ReleaseOutcome::Disposed
    );
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(!root.contains(&Key::of::<Session>()).await);
}

/// 通过 trait 对象使用对象图
#[tokio::test]
async fn test_graph_as_dyn_resolver() {
    let mut registry = ProviderRegistry::new();
    registry
        .register(Provider::default_of::<NoteModel>().qualified("note"))
        .unwrap();
    let resolver: Arc<dyn Resolver> = Arc::new(Graph::with_registry(registry));

    assert!(resolver.can_resolve(&note_key()));
    assert!(!resolver.can_resolve(&Key::of::<Session>()));

    let model = resolver
        .resolve_as::<NoteModel>(&note_key(), &ScopeChain::root())
        .await
        .unwrap();
    assert!(model.value.title.lock().is_empty());
    assert_eq!(
        resolver.release(&note_key(), &model.scope).await.unwrap(),
        ReleaseOutcome::Disposed
    );
}
