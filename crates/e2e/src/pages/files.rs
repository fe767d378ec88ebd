use tracing::info;

use crate::encoding::css_escape;
use crate::error::E2eResult;
use crate::page::Page;
use crate::wait::WaitConfig;

const FILE_LIST: &str = ".files-fileList";
const NEW_BUTTON: &str = ".files-controls .actions > .button.new";
const NEW_FOLDER_ENTRY: &str = r#".files-controls .actions .newFileMenu a[data-action="folder"]"#;

/// The file listing of the Files app.
pub struct FileList<'a> {
    page: &'a Page,
}

impl<'a> FileList<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Selector of the table row for `name`.
    pub fn row(name: &str) -> String {
        format!(r#"{FILE_LIST} tr[data-file="{}"]"#, css_escape(name))
    }

    fn link(name: &str) -> String {
        format!("{} a.name", Self::row(name))
    }

    /// Asserts exactly one row for `name` exists and mentions the name.
    pub async fn expect_listed(&self, name: &str, wait: WaitConfig) -> E2eResult<()> {
        let row = Self::row(name);
        self.page.expect_text_contains(&row, name, wait).await?;
        self.page.expect_count(&row, 1, wait).await
    }

    pub async fn open(&self, name: &str) -> E2eResult<()> {
        self.page.click(&Self::link(name), self.page.wait()).await
    }

    /// The row's numeric `data-id`.
    pub async fn file_id(&self, name: &str) -> E2eResult<String> {
        self.page
            .expect_attribute(&Self::row(name), "data-id", self.page.wait())
            .await
    }

    /// Opens the row's action menu and picks "Delete".
    pub async fn delete(&self, name: &str) -> E2eResult<()> {
        let wait = self.page.wait();
        let link = Self::link(name);
        self.page
            .click(&format!("{link} .action-menu"), wait)
            .await?;
        self.page
            .click(&format!("{link} + .popovermenu .action-delete"), wait)
            .await
    }

    /// Creates a folder through the "New" menu.
    pub async fn create_folder(&self, name: &str) -> E2eResult<()> {
        let wait = self.page.wait();
        self.page.click(NEW_BUTTON, wait).await?;
        self.page.click(NEW_FOLDER_ENTRY, wait).await?;
        self.page
            .type_text(&format!(r#"{NEW_FOLDER_ENTRY} input[type="text"]"#), name, wait)
            .await?;
        self.page
            .click(&format!("{NEW_FOLDER_ENTRY} input.icon-confirm"), wait)
            .await?;
        info!("Created folder {}", name);
        Ok(())
    }
}
