//! Candidate folders for views, layouts and partials.
//!
//! Order encodes precedence: area folders before site folders, and within a
//! level the controller folder before the shared folder before the bare root.

use crate::domain::group::GroupKey;

pub const ROOT_MARKER: &str = "~/";

const DEFAULT_VIEWS_FOLDER: &str = "Views";
const DEFAULT_AREAS_FOLDER: &str = "Areas";
const DEFAULT_PARTIALS_FOLDER: &str = "_Partials";
const DEFAULT_LAYOUTS_FOLDER: &str = "_Layouts";
const DEFAULT_SHARED_FOLDER: &str = "_Shared";

/// Folder names used to build search paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSettings {
    pub views_folder: String,
    pub areas_folder: String,
    pub partials_folder: String,
    pub layouts_folder: String,
    /// Empty disables the shared folder.
    pub shared_folder: String,
    /// Also search the bare views folder, outside any controller folder.
    pub allow_controllerless: bool,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            views_folder: DEFAULT_VIEWS_FOLDER.to_string(),
            areas_folder: DEFAULT_AREAS_FOLDER.to_string(),
            partials_folder: DEFAULT_PARTIALS_FOLDER.to_string(),
            layouts_folder: DEFAULT_LAYOUTS_FOLDER.to_string(),
            shared_folder: DEFAULT_SHARED_FOLDER.to_string(),
            allow_controllerless: false,
        }
    }
}

impl From<&crate::config::ViewSettings> for PathSettings {
    fn from(settings: &crate::config::ViewSettings) -> Self {
        Self {
            views_folder: settings.views_folder.clone(),
            areas_folder: settings.areas_folder.clone(),
            partials_folder: settings.partials_folder.clone(),
            layouts_folder: settings.layouts_folder.clone(),
            shared_folder: settings.shared_folder.clone(),
            allow_controllerless: settings.allow_controllerless,
        }
    }
}

/// Pure mapping from a group to its ordered search folders.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    settings: PathSettings,
}

impl PathResolver {
    pub fn new(settings: PathSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PathSettings {
        &self.settings
    }

    pub fn view_folders(&self, group: &GroupKey) -> Vec<String> {
        let mut folders = Vec::new();
        for root in self.roots(group) {
            folders.push(format!("{root}{}/", group.controller()));
            if !self.settings.shared_folder.is_empty() {
                folders.push(format!("{root}{}/", self.settings.shared_folder));
            }
            if self.settings.allow_controllerless {
                folders.push(root);
            }
        }
        folders
    }

    pub fn layout_folders(&self, group: &GroupKey) -> Vec<String> {
        self.special_folders(group, &self.settings.layouts_folder)
    }

    pub fn partial_folders(&self, group: &GroupKey) -> Vec<String> {
        self.special_folders(group, &self.settings.partials_folder)
    }

    fn special_folders(&self, group: &GroupKey, name: &str) -> Vec<String> {
        self.roots(group)
            .into_iter()
            .flat_map(|root| {
                [
                    format!("{root}{}/{name}/", group.controller()),
                    format!("{root}{name}/"),
                ]
            })
            .collect()
    }

    /// Views roots, area first.
    fn roots(&self, group: &GroupKey) -> Vec<String> {
        let views = &self.settings.views_folder;
        let mut roots = Vec::with_capacity(2);
        if let Some(area) = group.area() {
            roots.push(format!(
                "{ROOT_MARKER}{}/{area}/{views}/",
                self.settings.areas_folder
            ));
        }
        roots.push(format!("{ROOT_MARKER}{views}/"));
        roots
    }
}
