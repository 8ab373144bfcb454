/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Collaborator interfaces consumed by the executor.
//!
//! Template storage, theming and the PDF layout engine live outside the
//! queue. The executor only needs to resolve a version, look up themes and
//! turn a template model plus data into bytes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, ResolutionError};
use crate::models::TemplateTarget;

/// A fully resolved template version, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateModel {
    pub tenant_id: String,
    pub template_id: String,
    pub variant_id: String,
    /// The concrete version chosen, even when the request named an environment
    pub version_id: String,
    /// Theme attached to the template, if any
    pub theme_id: Option<String>,
    /// Opaque template definition understood by the renderer
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub definition: serde_json::Value,
}

/// Resolves the template version a request targets.
///
/// For [`TemplateTarget::Environment`] this must return whatever version is
/// active in that environment at the time of the call.
#[async_trait]
pub trait VersionResolver: Send + Sync {
    async fn resolve(
        &self,
        tenant_id: &str,
        template_id: &str,
        variant_id: &str,
        target: &TemplateTarget,
    ) -> Result<TemplateModel, ResolutionError>;
}

/// Tenant and theme lookup.
#[async_trait]
pub trait ThemeProvider: Send + Sync {
    /// Theme attached to the resolved template, if it has one.
    async fn template_theme(
        &self,
        model: &TemplateModel,
    ) -> Result<Option<Theme>, ResolutionError>;

    /// Tenant-level default theme. Returns [`ResolutionError::TenantNotFound`]
    /// when the tenant does not exist.
    async fn tenant_fallback_theme(&self, tenant_id: &str)
        -> Result<Option<Theme>, ResolutionError>;
}

/// Everything handed to the renderer for one document.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub model: &'a TemplateModel,
    pub data: &'a serde_json::Value,
    pub theme: Option<&'a Theme>,
    pub fallback_theme: Option<&'a Theme>,
}

/// Renders a document into an in-memory buffer.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, input: RenderInput<'_>) -> Result<Vec<u8>, RenderError>;
}
