//! The page around the viewer: a model picker, the controls help and the load
//! status line.

use imgui::{Condition, Ui};

use crate::{listing::ModelDescriptor, viewer::LoadStatus};

pub const PAGE_TITLE: &str = "3D Model Viewer";
pub const PLACEHOLDER: &str = "Select a model to view";

const CONTROLS_HELP: [(&str, &str); 4] = [
    ("Left Click + Drag", "Rotate the model"),
    ("Right Click + Drag", "Pan the view"),
    ("Scroll Wheel", "Zoom in/out"),
    ("Double Click", "Reset view"),
];

/// What the viewer should show after the user picked something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Nothing,
    Model(String),
}

#[derive(Debug, Clone, PartialEq)]
enum ModelList {
    Loading,
    Loaded(Vec<ModelDescriptor>),
    Failed(String),
}

pub struct ModelPicker {
    list: ModelList,
    /// Index into `labels()`; 0 is the placeholder.
    selected: usize,
    show_controls: bool,
}

impl ModelPicker {
    pub fn new() -> Self {
        Self {
            list: ModelList::Loading,
            selected: 0,
            show_controls: false,
        }
    }

    pub fn set_models(&mut self, models: Result<Vec<ModelDescriptor>, String>) {
        let selected_path = self.selected_path().map(String::from);

        self.list = match models {
            Ok(models) => {
                log::info!("Found {} models", models.len());
                ModelList::Loaded(models)
            }
            Err(message) => {
                log::error!("Error fetching models: {}", message);
                ModelList::Failed(message)
            }
        };

        // Keep pointing at the same model if it is still listed
        self.selected = selected_path
            .and_then(|path| self.position_of(&path))
            .unwrap_or(0);
    }

    fn models(&self) -> &[ModelDescriptor] {
        match &self.list {
            ModelList::Loaded(models) => models,
            _ => &[],
        }
    }

    fn position_of(&self, path: &str) -> Option<usize> {
        self.models()
            .iter()
            .position(|model| model.path == path)
            .map(|index| index + 1)
    }

    /// Marks `path` as selected without reporting a change, used when the
    /// viewer was started on a model directly.
    pub fn preselect(&mut self, path: &str) {
        if let Some(index) = self.position_of(path) {
            self.selected = index;
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        std::iter::once(PLACEHOLDER)
            .chain(self.models().iter().map(|model| model.name.as_str()))
            .collect()
    }

    pub fn selected_path(&self) -> Option<&str> {
        self.selected
            .checked_sub(1)
            .and_then(|index| self.models().get(index))
            .map(|model| model.path.as_str())
    }

    /// Selects the entry at `index` in `labels()`. Returns the new selection
    /// if it changed.
    pub fn select(&mut self, index: usize) -> Option<Selection> {
        if index == self.selected || index > self.models().len() {
            return None;
        }

        self.selected = index;

        Some(match self.selected_path() {
            Some(path) => Selection::Model(path.to_string()),
            None => Selection::Nothing,
        })
    }

    pub fn draw(&mut self, ui: &Ui, status: Option<&LoadStatus>) -> Option<Selection> {
        let mut selection = None;

        ui.window(PAGE_TITLE)
            .position([10.0, 10.0], Condition::FirstUseEver)
            .size([320.0, 0.0], Condition::FirstUseEver)
            .always_auto_resize(true)
            .build(|| {
                let toggle = if self.show_controls {
                    "Hide Controls"
                } else {
                    "Show Controls"
                };
                if ui.button(toggle) {
                    self.show_controls = !self.show_controls;
                }

                if self.show_controls {
                    ui.text("Controls:");
                    for (input, action) in CONTROLS_HELP {
                        ui.bullet_text(format!("{}: {}", input, action));
                    }
                }

                ui.separator();

                let mut index = self.selected;
                let changed = {
                    let labels = self.labels();
                    let _width = ui.push_item_width(300.0);
                    ui.combo_simple_string("##model", &mut index, &labels)
                };
                if changed {
                    selection = self.select(index);
                }

                match &self.list {
                    ModelList::Loading => ui.text_disabled("Fetching model list..."),
                    ModelList::Failed(message) => {
                        ui.text_colored([1.0, 0.4, 0.4, 1.0], format!("No models: {}", message))
                    }
                    ModelList::Loaded(_) => {}
                }

                match status {
                    Some(LoadStatus::Loading { percent: Some(percent) }) => {
                        ui.text(format!("Loading... {:.0}%", percent))
                    }
                    Some(LoadStatus::Loading { percent: None }) => ui.text("Loading..."),
                    Some(LoadStatus::Failed(message)) => ui.text_colored(
                        [1.0, 0.4, 0.4, 1.0],
                        format!("Failed to load model: {}", message),
                    ),
                    Some(LoadStatus::Loaded) | None => {}
                }
            });

        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<ModelDescriptor> {
        names
            .iter()
            .map(|name| ModelDescriptor::from_file_name(&format!("{}.glb", name)).unwrap())
            .collect()
    }

    #[test]
    fn placeholder_comes_first() {
        let mut picker = ModelPicker::new();
        assert_eq!(picker.labels(), [PLACEHOLDER]);

        picker.set_models(Ok(models(&["duck", "fox"])));

        assert_eq!(picker.labels(), [PLACEHOLDER, "duck", "fox"]);
        assert_eq!(picker.selected_path(), None);
    }

    #[test]
    fn selecting_a_model_and_back_to_placeholder() {
        let mut picker = ModelPicker::new();
        picker.set_models(Ok(models(&["duck", "fox"])));

        assert_eq!(
            picker.select(2),
            Some(Selection::Model("/models/fox.glb".into()))
        );
        assert_eq!(picker.select(2), None);
        assert_eq!(picker.select(0), Some(Selection::Nothing));
        assert_eq!(picker.select(9), None);
    }

    #[test]
    fn failed_listing_leaves_only_the_placeholder() {
        let mut picker = ModelPicker::new();

        picker.set_models(Err("connection refused".into()));

        assert_eq!(picker.labels(), [PLACEHOLDER]);
        assert_eq!(picker.select(1), None);
    }

    #[test]
    fn refreshed_list_keeps_the_current_model() {
        let mut picker = ModelPicker::new();
        picker.set_models(Ok(models(&["duck", "fox"])));
        picker.select(2);

        picker.set_models(Ok(models(&["avocado", "duck", "fox"])));

        assert_eq!(picker.selected_path(), Some("/models/fox.glb"));
    }

    #[test]
    fn preselect_matches_by_path() {
        let mut picker = ModelPicker::new();
        picker.set_models(Ok(models(&["duck", "fox"])));

        picker.preselect("/models/duck.glb");
        picker.preselect("/models/unknown.glb");

        assert_eq!(picker.selected_path(), Some("/models/duck.glb"));
    }
}
