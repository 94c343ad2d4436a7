use super::dto::{FileObject, Page, PropertyValue, PROP_ANALYSIS_DONE, PROP_MEAL_PHOTO};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSource {
    /// Uploaded to the store; the URL expires and needs the store credential.
    Hosted,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub url: String,
    pub name: Option<String>,
    pub source: PhotoSource,
    pub expires_at: Option<String>,
}

/// A meal log entry as this job sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealRecord {
    pub id: String,
    pub photo: Option<PhotoRef>,
    /// Absent or non-checkbox flags count as not done.
    pub analysis_done: bool,
}

impl From<Page> for MealRecord {
    fn from(mut page: Page) -> Self {
        let analysis_done = matches!(
            page.properties.get(PROP_ANALYSIS_DONE),
            Some(PropertyValue::Checkbox { checkbox: true })
        );

        let photo = match page.properties.remove(PROP_MEAL_PHOTO) {
            Some(PropertyValue::Files { files }) => files.into_iter().find_map(|f| match f {
                FileObject::File { name, file } => Some(PhotoRef {
                    url: file.url,
                    name,
                    source: PhotoSource::Hosted,
                    expires_at: file.expiry_time,
                }),
                FileObject::External { name, external } => Some(PhotoRef {
                    url: external.url,
                    name,
                    source: PhotoSource::External,
                    expires_at: None,
                }),
                FileObject::Other => None,
            }),
            _ => None,
        };

        Self {
            id: page.id,
            photo,
            analysis_done,
        }
    }
}
