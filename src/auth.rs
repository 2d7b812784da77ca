//! Token material: redacted secrets, refresh pairs, and the per-client store.

// self
use crate::_prelude::*;

/// Reads a token from caller-owned storage.
pub type TokenGetter = Arc<dyn Fn() -> Option<String> + Send + Sync>;
/// Writes a token back into caller-owned storage; `None` clears it.
pub type TokenSetter = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Token pair produced by a successful refresh exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshTokens {
	/// Freshly issued access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token; reuses the previous one when the endpoint omits it.
	pub refresh_token: TokenSecret,
}

/// Caller-owned token storage callbacks.
///
/// When a callback is present it takes precedence over the client's internal
/// token cells, both for reads and for writes performed by the refresh
/// coordinator and the token setters.
#[derive(Clone, Default)]
pub struct TokenCallbacks {
	/// Reads the current access token.
	pub get_access_token: Option<TokenGetter>,
	/// Persists a new access token.
	pub set_access_token: Option<TokenSetter>,
	/// Reads the current refresh token.
	pub get_refresh_token: Option<TokenGetter>,
	/// Persists a new refresh token.
	pub set_refresh_token: Option<TokenSetter>,
}
impl Debug for TokenCallbacks {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCallbacks")
			.field("get_access_token", &self.get_access_token.is_some())
			.field("set_access_token", &self.set_access_token.is_some())
			.field("get_refresh_token", &self.get_refresh_token.is_some())
			.field("set_refresh_token", &self.set_refresh_token.is_some())
			.finish()
	}
}

/// Per-client token cells with the config's read/write resolution order.
///
/// In single-token mode only the static cell is consulted. In multi-token mode
/// reads prefer the caller's callbacks and fall back to the internal cells;
/// writes go through the callbacks when present and land in the cells
/// otherwise. All mutations happen through `parking_lot` locks so the refresh
/// coordinator and the public setters never race.
#[derive(Debug)]
pub struct TokenStore {
	multi_token: bool,
	static_token: RwLock<Option<TokenSecret>>,
	access_token: RwLock<Option<TokenSecret>>,
	refresh_token: RwLock<Option<TokenSecret>>,
	callbacks: Option<TokenCallbacks>,
}
impl TokenStore {
	/// Builds a single-token store around an optional static token.
	pub fn single(token: Option<String>) -> Self {
		Self {
			multi_token: false,
			static_token: RwLock::new(token.map(TokenSecret::new)),
			access_token: RwLock::new(None),
			refresh_token: RwLock::new(None),
			callbacks: None,
		}
	}

	/// Builds a multi-token store with optional seeds and callbacks.
	pub fn multi(
		access_token: Option<String>,
		refresh_token: Option<String>,
		callbacks: Option<TokenCallbacks>,
	) -> Self {
		Self {
			multi_token: true,
			static_token: RwLock::new(None),
			access_token: RwLock::new(access_token.map(TokenSecret::new)),
			refresh_token: RwLock::new(refresh_token.map(TokenSecret::new)),
			callbacks,
		}
	}

	/// Returns `true` when the store operates in multi-token mode.
	pub fn is_multi_token(&self) -> bool {
		self.multi_token
	}

	/// Resolves the token attached as `Authorization: Bearer <token>`.
	pub fn access_token(&self) -> Option<String> {
		if !self.multi_token {
			return self.static_token.read().as_ref().map(|secret| secret.expose().into());
		}
		if let Some(getter) =
			self.callbacks.as_ref().and_then(|callbacks| callbacks.get_access_token.as_ref())
			&& let Some(token) = getter()
		{
			return Some(token);
		}

		self.access_token.read().as_ref().map(|secret| secret.expose().into())
	}

	/// Resolves the refresh token used by the refresh exchange.
	pub fn refresh_token(&self) -> Option<String> {
		if let Some(getter) =
			self.callbacks.as_ref().and_then(|callbacks| callbacks.get_refresh_token.as_ref())
			&& let Some(token) = getter()
		{
			return Some(token);
		}

		self.refresh_token.read().as_ref().map(|secret| secret.expose().into())
	}

	/// Persists a new access token (or clears it) into the mode-appropriate slot.
	pub fn store_access_token(&self, token: Option<&str>) {
		if !self.multi_token {
			*self.static_token.write() = token.map(TokenSecret::new);

			return;
		}
		if let Some(setter) =
			self.callbacks.as_ref().and_then(|callbacks| callbacks.set_access_token.as_ref())
		{
			setter(token);
		} else {
			*self.access_token.write() = token.map(TokenSecret::new);
		}
	}

	/// Persists a new refresh token (or clears it).
	pub fn store_refresh_token(&self, token: Option<&str>) {
		if let Some(setter) =
			self.callbacks.as_ref().and_then(|callbacks| callbacks.set_refresh_token.as_ref())
		{
			setter(token);
		} else {
			*self.refresh_token.write() = token.map(TokenSecret::new);
		}
	}
}
