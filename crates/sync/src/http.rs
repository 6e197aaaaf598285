// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! REST adapter for the remote collection store.
//!
//! Speaks a PostgREST-style dialect: one resource per collection, equality
//! filters as `column=eq.value` query parameters, `POST` with
//! `Prefer: resolution=merge-duplicates` for upserts and `PATCH` for updates.
//! Deletes are soft: they patch `deleted = true`.
//!
//! Connection failures and timeouts map to [`RemoteError::Transport`];
//! any non-2xx response maps to [`RemoteError::Application`].

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tend_core::Fields;

use crate::connectivity::NetworkProbe;
use crate::error::{Error, Result};
use crate::store::{Filter, RemoteError, RemoteResult, RemoteStore, StoreFuture};

/// Remote store over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("remote url is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;
        Ok(HttpRemoteStore { base_url, api_key, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() { status.to_string() } else { body };
        Err(RemoteError::application(status.as_u16(), message))
    }
}

/// Query pairs for an equality filter.
pub(crate) fn filter_query(filter: &Filter) -> Vec<(String, String)> {
    filter.equals.iter().map(|(column, value)| (column.clone(), format!("eq.{value}"))).collect()
}

fn classify(error: reqwest::Error) -> RemoteError {
    match error.status() {
        Some(status) => RemoteError::application(status.as_u16(), error.to_string()),
        None => RemoteError::transport(error.to_string()),
    }
}

impl RemoteStore for HttpRemoteStore {
    fn select<'a>(&'a self, collection: &'a str, filter: &'a Filter) -> StoreFuture<'a, Vec<Fields>> {
        Box::pin(async move {
            let url = self.collection_url(collection);
            let request = self.request(Method::GET, &url).query(&filter_query(filter));
            let response = self.send(request).await?;
            let status = response.status().as_u16();
            response
                .json::<Vec<Fields>>()
                .await
                .map_err(|e| RemoteError::application(status, format!("invalid {collection} response: {e}")))
        })
    }

    fn insert<'a>(&'a self, collection: &'a str, record: Fields) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let url = self.collection_url(collection);
            let request = self
                .request(Method::POST, &url)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&record);
            self.send(request).await.map(drop)
        })
    }

    fn update<'a>(&'a self, collection: &'a str, id: &'a str, patch: Fields) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let url = self.collection_url(collection);
            let request = self.request(Method::PATCH, &url).query(&[("id", format!("eq.{id}"))]).json(&patch);
            self.send(request).await.map(drop)
        })
    }

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, ()> {
        let mut patch = Fields::new();
        patch.insert("deleted".into(), Value::Bool(true));
        self.update(collection, id, patch)
    }
}

impl NetworkProbe for HttpRemoteStore {
    fn probe(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let request = self.request(Method::GET, &format!("{}/", self.base_url));
            self.send(request).await.map(drop)
        })
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
