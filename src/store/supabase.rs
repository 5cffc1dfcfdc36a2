//! Supabase REST API client using service_role key

use axum::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::SupabaseConfig;

use super::{
    Database, FriendshipRecord, FriendshipStatus, ProfileRecord, StoreError, TwoFactorUpdate,
    UserRecord,
};

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.clone(),
            service_role_key: config.service_role_key.clone(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Attach service-role credentials to a request
    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SupabaseError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api { status: status.as_u16(), body });
        }
        Ok(response)
    }

    /// Authenticated request against a table; filters are url-encoded as
    /// separate query pairs
    fn request(&self, method: Method, table: &str, filters: &[Filter]) -> RequestBuilder {
        self.authed(self.client.request(method, self.rest_url(table)))
            .query(filters)
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
    ) -> Result<Vec<T>, SupabaseError> {
        let response = self
            .request(Method::GET, table, filters)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated GET request expecting at most one row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
    ) -> Result<Option<T>, SupabaseError> {
        let response = self
            .request(Method::GET, table, filters)
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated POST request (insert)
    pub async fn insert<T: Serialize>(&self, table: &str, data: &T) -> Result<(), SupabaseError> {
        let response = self
            .request(Method::POST, table, &[])
            .header("Prefer", "return=minimal")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await.map(|_| ())
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        filters: &[Filter],
        data: &T,
    ) -> Result<(), SupabaseError> {
        let response = self
            .request(Method::PATCH, table, filters)
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await.map(|_| ())
    }

    /// PATCH and return the updated rows, so callers can tell whether the
    /// filters matched
    pub async fn update_returning<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
        data: &T,
    ) -> Result<Vec<R>, SupabaseError> {
        let response = self
            .request(Method::PATCH, table, filters)
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(SupabaseError::Parse)
    }

    /// Make an authenticated DELETE request
    pub async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), SupabaseError> {
        let response = self
            .request(Method::DELETE, table, filters)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        Self::check(response).await.map(|_| ())
    }
}

/// One PostgREST query pair, e.g. `("id", "eq.<uuid>")`
pub type Filter = (&'static str, String);

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

/// Postgres array literal of hex digests, e.g. `{ab12,cd34}`
fn array_literal(values: &[String]) -> String {
    format!("{{{}}}", values.join(","))
}

/// Escape `ilike` pattern characters so `value` matches literally
fn ilike_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_' | '*') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),
}

impl SupabaseError {
    /// PostgREST reports unique violations as 409
    fn is_conflict(&self) -> bool {
        matches!(self, SupabaseError::Api { status: 409, .. })
    }
}

fn conflict_as(what: &'static str) -> impl Fn(SupabaseError) -> StoreError {
    move |e| {
        if e.is_conflict() {
            StoreError::Conflict(what)
        } else {
            StoreError::Supabase(e)
        }
    }
}

/// [`Database`] over the `users`, `profiles` and `friendships` tables
#[derive(Clone)]
pub struct SupabaseDatabase {
    client: SupabaseClient,
}

impl SupabaseDatabase {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Database for SupabaseDatabase {
    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.client
            .insert("users", user)
            .await
            .map_err(conflict_as("email already registered"))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.client.get_one("users", &[("id", eq(id))]).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.client.get_one("users", &[("email", eq(email))]).await?)
    }

    async fn update_two_factor(&self, id: Uuid, update: &TwoFactorUpdate) -> Result<(), StoreError> {
        Ok(self.client.update("users", &[("id", eq(id))], update).await?)
    }

    async fn replace_backup_codes(
        &self,
        id: Uuid,
        expected: &[String],
        remaining: &[String],
    ) -> Result<bool, StoreError> {
        let filters = [("id", eq(id)), ("backup_codes", eq(array_literal(expected)))];
        let updated: Vec<UserRecord> = self
            .client
            .update_returning("users", &filters, &json!({ "backup_codes": remaining }))
            .await?;
        Ok(!updated.is_empty())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        Ok(self.client.delete("users", &[("id", eq(id))]).await?)
    }

    async fn insert_profile(&self, profile: &ProfileRecord) -> Result<(), StoreError> {
        self.client
            .insert("profiles", profile)
            .await
            .map_err(conflict_as("username already taken"))
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<ProfileRecord>, StoreError> {
        Ok(self.client.get_one("profiles", &[("user_id", eq(user_id))]).await?)
    }

    async fn find_profile_by_username(
        &self,
        username: &str,
    ) -> Result<Option<ProfileRecord>, StoreError> {
        // Usernames compare case-insensitively, as in the memory backend
        let filters = [("username", format!("ilike.{}", ilike_literal(username)))];
        Ok(self.client.get_one("profiles", &filters).await?)
    }

    async fn list_profiles(&self, user_ids: &[Uuid]) -> Result<Vec<ProfileRecord>, StoreError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = user_ids.iter().map(|id| id.to_string()).collect();
        let filters = [("user_id", format!("in.({})", ids.join(",")))];
        Ok(self.client.get("profiles", &filters).await?)
    }

    async fn search_profiles(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<ProfileRecord>, StoreError> {
        let filters = [
            ("username", format!("ilike.{}*", ilike_literal(prefix))),
            ("order", "username.asc".to_string()),
            ("limit", limit.to_string()),
        ];
        Ok(self.client.get("profiles", &filters).await?)
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> Result<(), StoreError> {
        self.client
            .update(
                "profiles",
                &[("user_id", eq(user_id))],
                &json!({ "username": username }),
            )
            .await
            .map_err(conflict_as("username already taken"))
    }

    async fn insert_friendship(&self, friendship: &FriendshipRecord) -> Result<(), StoreError> {
        self.client
            .insert("friendships", friendship)
            .await
            .map_err(conflict_as("friendship already exists"))
    }

    async fn find_friendship(&self, id: Uuid) -> Result<Option<FriendshipRecord>, StoreError> {
        Ok(self.client.get_one("friendships", &[("id", eq(id))]).await?)
    }

    async fn find_friendship_between(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<FriendshipRecord>, StoreError> {
        let filters = [(
            "or",
            format!(
                "(and(requester_id.eq.{a},addressee_id.eq.{b}),and(requester_id.eq.{b},addressee_id.eq.{a}))"
            ),
        )];
        let mut rows: Vec<FriendshipRecord> = self.client.get("friendships", &filters).await?;
        Ok(rows.pop())
    }

    async fn update_friendship_status(
        &self,
        id: Uuid,
        status: FriendshipStatus,
    ) -> Result<(), StoreError> {
        Ok(self
            .client
            .update("friendships", &[("id", eq(id))], &json!({ "status": status }))
            .await?)
    }

    async fn delete_friendship(&self, id: Uuid) -> Result<(), StoreError> {
        Ok(self.client.delete("friendships", &[("id", eq(id))]).await?)
    }

    async fn list_friendships(
        &self,
        user_id: Uuid,
        status: FriendshipStatus,
    ) -> Result<Vec<FriendshipRecord>, StoreError> {
        let filters = [
            ("or", format!("(requester_id.eq.{user_id},addressee_id.eq.{user_id})")),
            ("status", eq(status.as_str())),
            ("order", "created_at.asc".to_string()),
        ];
        Ok(self.client.get("friendships", &filters).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient::new(&SupabaseConfig {
            url: "http://localhost:54321".to_string(),
            service_role_key: "service-key".to_string(),
        })
    }

    fn pairs(filters: &[Filter]) -> Vec<(String, String)> {
        let request = client()
            .request(Method::GET, "profiles", filters)
            .build()
            .unwrap();
        request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn filter_values_cannot_add_query_pairs() {
        let hostile = "bob&user_id=eq.00000000-0000-0000-0000-000000000000#x";
        let got = pairs(&[("username", format!("ilike.{}", ilike_literal(hostile)))]);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, "username");
        assert!(got[0].1.ends_with("#x"));
    }

    #[test]
    fn plus_in_email_survives_encoding() {
        let got = pairs(&[("email", eq("a+b@example.com"))]);
        assert_eq!(got, vec![("email".to_string(), "eq.a+b@example.com".to_string())]);
    }

    #[test]
    fn backup_code_swap_filters_on_current_list() {
        assert_eq!(array_literal(&[]), "{}");
        let codes = vec!["ab12".to_string(), "cd34".to_string()];
        let got = pairs(&[("backup_codes", eq(array_literal(&codes)))]);
        assert_eq!(got[0].1, "eq.{ab12,cd34}");
    }

    #[test]
    fn ilike_wildcards_are_escaped() {
        assert_eq!(ilike_literal("the_best"), "the\\_best");
        assert_eq!(ilike_literal("a%b*c"), "a\\%b\\*c");
        assert_eq!(ilike_literal("plain"), "plain");
    }
}
