use tracing::debug;

use crate::error::E2eResult;
use crate::page::Page;

const USER_INPUT: &str = "input[name=user]";
const PASSWORD_INPUT: &str = "input[name=password]";
const SUBMIT: &str = "form[name=login] [type=submit]";
const LOGOUT_LINK: &str = r#"#expanddiv li[data-id="logout"] a"#;

pub struct LoginForm<'a> {
    page: &'a Page,
}

impl<'a> LoginForm<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Fills both credential fields and submits the form.
    pub async fn submit(&self, username: &str, password: &str) -> E2eResult<()> {
        let wait = self.page.wait();
        self.page.type_text(USER_INPUT, username, wait).await?;
        self.page.type_text(PASSWORD_INPUT, password, wait).await?;
        self.page.click(SUBMIT, wait).await
    }
}

/// The settings menu in the page header.
pub struct UserMenu<'a> {
    page: &'a Page,
}

impl<'a> UserMenu<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Resolved `href` of the logout entry, if the menu renders one.
    pub async fn logout_href(&self) -> E2eResult<Option<String>> {
        let href = self.page.property(LOGOUT_LINK, "href").await?;
        debug!("Logout link: {:?}", href);
        Ok(href.filter(|h| !h.is_empty()))
    }
}
