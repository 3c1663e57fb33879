use serde::Serialize;

/// Which municipality the user picked, if any.
///
/// Starts `Unselected`. Choosing a name moves to `Selected`, and choosing
/// another name replaces it; there is no way back to `Unselected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "name", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Unselected,
    Selected(String),
}

impl Selection {
    /// Builds the selection carried by a request. Blank input means nothing was chosen.
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            Some(name) if !name.is_empty() => Selection::Selected(name.to_string()),
            _ => Selection::Unselected,
        }
    }

    /// Applies a selector choice. Blank choices are ignored.
    pub fn select(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            *self = Selection::Selected(name.to_string());
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Selection::Unselected => None,
            Selection::Selected(name) => Some(name),
        }
    }
}
