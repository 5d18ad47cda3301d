//! 笔记控制器

use serde::{Deserialize, Serialize};
use tether_common::{ComponentKind, Key};
use tether_composition::{RuntimeBuilder, RuntimeResult};
use tether_mvc::{
    component_provider, model_key, model_provider, Component, ComponentBase, EventChannel,
    EventSender, StateCell,
};
use tracing::info;

/// 笔记模型
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteModel {
    /// 标题
    pub title: String,
    /// 正文
    pub content: String,
}

/// 笔记事件
#[derive(Debug, Clone, PartialEq)]
pub enum NoteEvent {
    /// 标题已修改
    TitleChanged(String),
    /// 正文已修改
    ContentChanged {
        /// 正文长度
        length: usize,
    },
}

/// 笔记控制器
pub struct NoteController {
    base: ComponentBase<NoteModel, NoteEvent>,
}

impl NoteController {
    /// 修改标题
    pub fn set_title(&self, title: &str) {
        self.base.model().write().title = title.to_string();
        self.base.post(NoteEvent::TitleChanged(title.to_string()));
    }

    /// 追加一行正文
    pub fn append_line(&self, line: &str) {
        let length = self.base.model().update(|model| {
            if !model.content.is_empty() {
                model.content.push('\n');
            }
            model.content.push_str(line);
            model.content.len()
        });
        self.base.post(NoteEvent::ContentChanged { length });
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
        info!("笔记已恢复: {}", self.base.model().read().title);
    }
}

/// 笔记模型的键
pub fn note_model_key() -> Key {
    model_key::<NoteModel>(Some("note"))
}

/// 注册笔记相关的提供者
pub fn register(builder: RuntimeBuilder) -> RuntimeResult<RuntimeBuilder> {
    builder
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
                })
            },
        ))
}
