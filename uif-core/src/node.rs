use serde::{Deserialize, Serialize};

/// Object identifier assigned by the client.
pub type ObjectId = u32;

/// Sentinel parent for top-level nodes. Never a live node.
pub const ROOT_ID: ObjectId = 0xff_ff_ff_ff;

/// UI object content. Externally tagged on the wire: `{ "Label": { "text": "..." } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Window {
        title: String,
    },
    LeftToRightLayout {},
    Label {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heading: Option<bool>,
    },
    TextNode {
        text: String,
    },
    TextInput {
        text: String,
        on_changed: String,
    },
    Button {
        text: String,
        on_clicked: String,
    },
    ComboBox {
        label: String,
        selected: String,
        options: Vec<String>,
        on_changed: String,
    },
}

/// Which kind of UI event an interactive node asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Changed,
    Clicked,
}

impl Node {
    pub fn window(title: impl Into<String>) -> Self {
        Node::Window { title: title.into() }
    }

    pub fn layout() -> Self {
        Node::LeftToRightLayout {}
    }

    pub fn label(text: impl Into<String>) -> Self {
        Node::Label {
            text: text.into(),
            heading: None,
        }
    }

    pub fn text_input(text: impl Into<String>, on_changed: impl Into<String>) -> Self {
        Node::TextInput {
            text: text.into(),
            on_changed: on_changed.into(),
        }
    }

    pub fn button(text: impl Into<String>, on_clicked: impl Into<String>) -> Self {
        Node::Button {
            text: text.into(),
            on_clicked: on_clicked.into(),
        }
    }

    /// Variant name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Window { .. } => "Window",
            Node::LeftToRightLayout {} => "LeftToRightLayout",
            Node::Label { .. } => "Label",
            Node::TextNode { .. } => "TextNode",
            Node::TextInput { .. } => "TextInput",
            Node::Button { .. } => "Button",
            Node::ComboBox { .. } => "ComboBox",
        }
    }

    /// Containers are expected to carry children; the tree does not enforce it.
    pub fn is_container(&self) -> bool {
        matches!(self, Node::Window { .. } | Node::LeftToRightLayout {})
    }

    /// The event id this node registers interest in, if it is interactive.
    pub fn subscription(&self) -> Option<(&str, EventKind)> {
        match self {
            Node::TextInput { on_changed, .. } | Node::ComboBox { on_changed, .. } => {
                Some((on_changed.as_str(), EventKind::Changed))
            }
            Node::Button { on_clicked, .. } => Some((on_clicked.as_str(), EventKind::Clicked)),
            _ => None,
        }
    }

    /// Short human-readable summary used in tree outlines.
    pub fn describe(&self) -> String {
        match self {
            Node::Window { title } => format!("Window {title:?}"),
            Node::LeftToRightLayout {} => "LeftToRightLayout".to_string(),
            Node::Label { text, heading } => match heading {
                Some(true) => format!("Label {text:?} (heading)"),
                _ => format!("Label {text:?}"),
            },
            Node::TextNode { text } => format!("TextNode {text:?}"),
            Node::TextInput { text, on_changed } => {
                format!("TextInput {text:?} on_changed={on_changed}")
            }
            Node::Button { text, on_clicked } => format!("Button {text:?} on_clicked={on_clicked}"),
            Node::ComboBox {
                label,
                selected,
                options,
                on_changed,
            } => format!(
                "ComboBox {label:?} selected={selected:?} options={} on_changed={on_changed}",
                options.len()
            ),
        }
    }
}
