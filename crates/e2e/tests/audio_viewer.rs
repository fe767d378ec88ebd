//! Opens an mp3 and an ogg file in the viewer and steps between them.
//!
//! Needs a running server and Chrome:
//! `E2E_BASE_URL=http://localhost:8081 cargo test -p viewer-e2e --test audio_viewer -- --ignored`

use std::path::Path;
use std::time::Duration;

use viewer_e2e::commands::DEFAULT_ROUTE;
use viewer_e2e::config::RunnerConfig;
use viewer_e2e::fixtures::{FixtureContext, FixtureStore};
use viewer_e2e::pages::MediaKind;
use viewer_e2e::visual::VisualTester;
use viewer_e2e::wait::{WaitConfig, LONG_TIMEOUT};
use viewer_e2e::{ApiClient, E2eResult, Session, TestBrowser};

fn config() -> RunnerConfig {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut config = RunnerConfig {
        fixtures_dir: root.join("fixtures"),
        ..RunnerConfig::default()
    };
    if let Ok(url) = std::env::var("E2E_BASE_URL") {
        config.target.base_url = url;
    }
    config.visual.actual_dir = root.join("test-results/screenshots");
    config
}

async fn open_session(browser: &TestBrowser, config: &RunnerConfig) -> E2eResult<Session> {
    let client = ApiClient::new(&config.target)?;
    client.wait_until_ready(Duration::from_secs(30)).await?;

    let page = browser
        .new_page(client.base_url(), WaitConfig::with_timeout(config.assertion_timeout))
        .await?;
    Ok(Session::new(
        page,
        client,
        FixtureStore::new(config.fixtures_dir.clone()),
        VisualTester::new(config.visual.clone())?,
        FixtureContext::generate(&config.target.user_password),
    ))
}

async fn walkthrough(session: &mut Session) -> E2eResult<()> {
    // before
    let user = session.user().clone();
    session.create_user(&user).await?;
    session
        .login(&user.username, &user.password, DEFAULT_ROUTE)
        .await?;
    session.upload_file("audio.mp3", "audio/mpeg", "", None).await?;
    session.upload_file("audio.ogg", "audio/ogg", "", None).await?;
    session.page().visit(DEFAULT_ROUTE).await?;

    let wait = session.page().wait();
    let long = WaitConfig::with_timeout(LONG_TIMEOUT);
    let audios = session.context().media_count(MediaKind::Audio);

    // See audios in the list
    session.files().expect_listed("audio.mp3", long).await?;
    session.files().expect_listed("audio.ogg", long).await?;

    // Open the viewer on file click
    session.open_file("audio.mp3").await?;
    let viewer = session.viewer();
    viewer.expect_open(wait).await?;

    // Menu icon and title on the header
    viewer.expect_header("audio.mp3", wait).await?;

    // Next navigation arrow
    viewer.expect_media_count(MediaKind::Audio, audios, wait).await?;
    viewer
        .expect_active_source(
            MediaKind::Audio,
            &format!("{}/audio.mp3", user.dav_root()),
            wait,
        )
        .await?;
    viewer.expect_next_visible(wait).await?;

    // No loading animation
    viewer.expect_loaded(long).await?;
    session.screenshot("audio-viewer-mp3").await?;

    // Show audio.ogg on next
    let viewer = session.viewer();
    viewer.next().await?;
    viewer.expect_media_count(MediaKind::Audio, audios, wait).await?;
    viewer
        .expect_active_source(
            MediaKind::Audio,
            &format!("{}/audio.ogg", user.dav_root()),
            wait,
        )
        .await?;
    viewer.expect_prev_visible(wait).await?;
    viewer.expect_next_visible(wait).await?;

    viewer.expect_loaded(long).await?;
    session.screenshot("audio-viewer-ogg").await?;

    // Back to audio.mp3 on prev
    viewer.prev().await?;
    viewer
        .expect_active_source(
            MediaKind::Audio,
            &format!("{}/audio.mp3", user.dav_root()),
            wait,
        )
        .await?;

    // Close the viewer
    viewer.close().await?;
    viewer.expect_closed(wait).await?;

    Ok(())
}

#[tokio::test]
#[ignore] // Requires a running server and Chrome
async fn open_mp3_and_ogg_audio_in_viewer() {
    let config = config();
    let browser = TestBrowser::launch(&config.browser)
        .await
        .expect("failed to launch browser");

    let mut session = open_session(&browser, &config)
        .await
        .expect("failed to open session");

    let outcome = walkthrough(&mut session).await;

    // after
    session.logout().await.expect("logout failed");
    session.close().await.expect("failed to close page");
    browser.close().await.expect("failed to close browser");

    outcome.expect("audio viewer walkthrough failed");
}
