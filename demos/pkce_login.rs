//! Walks through the authorization-code + PKCE login and keeps the resulting token fresh.
//!
//! Without arguments the demo prints the authorization URL plus the verifier and state to
//! keep. Run it again with the browser's callback URL, the verifier, and the state to exchange
//! the code and store the token in `./tokens.json`:
//!
//! ```sh
//! cargo run --example pkce_login -- '<callback-url>' '<verifier>' '<state>'
//! ```

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
// self
use oauth2_token_manager::{
	auth::{ScopeList, TokenKey},
	flows::{PkceContext, PkceGenerator},
	manager::{TokenManager, TokenRefreshed},
	options::AuthOptions,
	resilience::{ResilienceOptions, ResiliencePolicy},
	store::FileStore,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let client_id = env::var("OAUTH_CLIENT_ID").unwrap_or_else(|_| "demo-client".into());
	let mut builder = AuthOptions::builder(client_id.as_str())
		.redirect_uri(Url::parse("http://127.0.0.1:8765/callback")?)
		.scopes(ScopeList::new(["openid"])?);

	if let Ok(secret) = env::var("OAUTH_CLIENT_SECRET") {
		builder = builder.client_secret(secret);
	}

	let options = builder.build()?;
	let args = env::args().skip(1).collect::<Vec<_>>();
	let [callback, verifier, state] = args.as_slice() else {
		let request = PkceGenerator::default().generate_authorization_request(&options, None);

		println!("Send your user to {}.", request.url());
		println!("Keep verifier `{}` and state `{}`.", request.code_verifier(), request.state());

		return Ok(());
	};
	let pkce = PkceContext::restore(verifier.as_str(), state.as_str())?;
	let code = pkce.validate_callback(&Url::parse(callback)?)?;
	let policy = Arc::new(ResiliencePolicy::new(ResilienceOptions::default()));
	let store = Arc::new(FileStore::open("tokens.json")?);
	let manager = TokenManager::with_reqwest(options, store, policy)?;
	let key = TokenKey::for_client(&client_id)?;

	manager.subscribe(Arc::new(|event: &TokenRefreshed| {
		println!("Token for `{}` refreshed; expires at {}.", event.key, event.current.expires_at());
	}));

	let token = manager.exchange_code(&key, &code, pkce.code_verifier()).await?;

	println!("Stored a {} token expiring at {}.", token.token_type(), token.expires_at());

	let token = manager.get_access_token(&key).await?;

	println!("Authorization header ready ({} bytes).", token.authorization_header().len());

	manager.shutdown();

	Ok(())
}
