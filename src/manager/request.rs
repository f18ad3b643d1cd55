//! Bearer authorization for outbound API requests, with one refresh and resend on `401`.

// crates.io
use reqwest::{
	Request, RequestBuilder, Response, StatusCode,
	header::{AUTHORIZATION, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenKey},
	error::{ConfigError, TransportError},
	manager::TokenManager,
	obs,
};

impl TokenManager {
	/// Adds an `Authorization` header carrying the token for `key`.
	///
	/// Requests that already carry an `Authorization` header are returned untouched.
	pub async fn authorize(
		&self,
		key: &TokenKey,
		request: RequestBuilder,
	) -> Result<RequestBuilder> {
		let (client, request) = request.build_split();
		let request = self.authorize_request(key, request.map_err(request_build)?).await?;

		Ok(RequestBuilder::from_parts(client, request))
	}

	/// Sends `request` with the token for `key` attached.
	///
	/// A `401` response triggers one refresh through the shared single-flight path and one
	/// resend with the new token. The first `401` response is returned when the refresh fails
	/// or the request body cannot be replayed.
	pub async fn send_authorized(
		&self,
		key: &TokenKey,
		request: RequestBuilder,
	) -> Result<Response> {
		let (client, request) = request.build_split();
		let request = self.authorize_request(key, request.map_err(request_build)?).await?;
		let replay = request.try_clone();
		let response = client.execute(request).await.map_err(TransportError::from)?;

		if response.status() != StatusCode::UNAUTHORIZED {
			return Ok(response);
		}

		let Some(mut replay) = replay else {
			return Ok(response);
		};

		obs::emit_unauthorized_retry(key);

		let token = match self.refresh_token(key).await {
			Ok(token) => token,
			Err(e) => {
				obs::emit_unauthorized_refresh_failed(key, &e);

				return Ok(response);
			},
		};

		drop(response);
		replay.headers_mut().insert(AUTHORIZATION, header_value(&token)?);

		client.execute(replay).await.map_err(|e| TransportError::from(e).into())
	}

	async fn authorize_request(&self, key: &TokenKey, mut request: Request) -> Result<Request> {
		if !request.headers().contains_key(AUTHORIZATION) {
			let token = self.get_access_token(key).await?;

			request.headers_mut().insert(AUTHORIZATION, header_value(&token)?);
		}

		Ok(request)
	}
}

fn header_value(token: &AccessToken) -> Result<HeaderValue> {
	let mut value = HeaderValue::from_str(&token.authorization_header())
		.map_err(|e| ConfigError::HttpRequest { source: Arc::new(e) })?;

	value.set_sensitive(true);

	Ok(value)
}

fn request_build(e: ReqwestError) -> Error {
	ConfigError::HttpRequest { source: Arc::new(e) }.into()
}
