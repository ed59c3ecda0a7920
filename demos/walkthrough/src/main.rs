use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use benevo::prelude::*;
use benevo::{Clock, ManualClock};

// ---------------------------------------------------------------------------
// A pretend auth backend
// ---------------------------------------------------------------------------

/// Issues one-hour tokens stamped against the shared clock.
#[derive(Clone)]
struct DemoAuth {
    clock: ManualClock,
    issued: Arc<AtomicU64>,
}

impl DemoAuth {
    fn token(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let exp = self.clock.now().as_millis() / 1000 + 3600;
        let claims = serde_json::json!({ "sub": "ada", "exp": exp, "n": n });
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }
}

impl IdentityProvider for DemoAuth {
    async fn exchange_credentials(&self, identifier: &str, secret: &str) -> Result<TokenGrant, IdentityError> {
        if secret != "correct horse" {
            return Err(IdentityError::Rejected("bad credentials".into()));
        }
        Ok(TokenGrant {
            access_token: self.token(),
            refresh_token: format!("refresh-{identifier}"),
            user_id: UserId::new(identifier),
            expires_in: Some(Duration::from_secs(3600)),
        })
    }

    async fn exchange_refresh_token(&self, _refresh_token: &str) -> Result<RefreshedToken, IdentityError> {
        Ok(RefreshedToken {
            access_token: self.token(),
            refresh_token: None,
            expires_in: Some(Duration::from_secs(3600)),
        })
    }
}

#[derive(Clone)]
struct DemoProfiles;

impl ProfileProvider for DemoProfiles {
    async fn fetch_current_user(&self, _access_token: &str) -> Result<UserProfile, IdentityError> {
        Ok(UserProfile {
            id: UserId::new("ada"),
            email: "ada@example.org".into(),
            display_name: Some("Ada".into()),
            role: Some(Role::Volunteer),
            profile_completed: true,
        })
    }
}

// ---------------------------------------------------------------------------
// Walkthrough
// ---------------------------------------------------------------------------

fn client(dir: &std::path::Path, clock: &ManualClock) -> Result<Client<DemoAuth, DemoProfiles>, BenevoError> {
    let auth = DemoAuth {
        clock: clock.clone(),
        issued: Arc::new(AtomicU64::new(0)),
    };
    Client::<DemoAuth, DemoProfiles>::builder()
        .storage_dir(dir)
        .clock(Arc::new(clock.clone()))
        .build(auth, DemoProfiles)
}

async fn visit(client: &Client<DemoAuth, DemoProfiles>, path: &str) {
    match client.navigate(path).await {
        RouteDecision::Allow => tracing::info!(path, "allowed"),
        RouteDecision::Redirect { to, reason } => tracing::info!(path, to, ?reason, "redirected"),
    }
}

#[tokio::main]
async fn main() -> Result<(), BenevoError> {
    benevo::init_tracing("info,benevo_session=debug,benevo_route=debug");

    let dir = std::env::temp_dir().join(format!("benevo-walkthrough-{}", std::process::id()));
    let clock = ManualClock::starting_now();

    tracing::info!(dir = %dir.display(), "first launch");
    let app = client(&dir, &clock)?;
    app.start().await;
    visit(&app, "/volunteer").await;

    if let Err(e) = app.login("ada", "wrong").await {
        tracing::info!(error = %e, "login refused");
    }
    app.login("ada", "correct horse").await?;
    for path in ["/volunteer/missions", "/association", "/admin", "/about"] {
        visit(&app, path).await;
    }
    if let Some(delay) = app.session().scheduler().armed_delay() {
        tracing::info!(?delay, "refresh scheduled");
    }

    tracing::info!("backgrounding for ten minutes");
    app.notify(VisibilityEvent::Hidden);
    tokio::time::sleep(Duration::from_millis(20)).await;
    clock.advance(Duration::from_secs(10 * 60));
    app.notify(VisibilityEvent::Visible);
    tokio::time::sleep(Duration::from_millis(50)).await;

    app.stop();
    drop(app);

    tracing::info!("second launch, same storage");
    let app = client(&dir, &clock)?;
    let snapshot = app.start().await;
    tracing::info!(phase = ?snapshot.phase, connected = snapshot.connected, "restored");
    visit(&app, "/volunteer").await;

    app.logout().await;
    visit(&app, "/volunteer").await;
    app.stop();

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
