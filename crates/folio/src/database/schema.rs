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

//! Diesel table definitions for both supported backends.
//!
//! The PostgreSQL tables use native `UUID` and `TIMESTAMP` columns. The SQLite
//! tables store UUIDs as 16-byte BLOBs and timestamps as fixed-width RFC 3339
//! text. Backend-specific row models live in [`crate::dal::models`].

pub mod postgres {
    diesel::table! {
        generation_batches (id) {
            id -> Uuid,
            tenant_id -> Text,
            total_count -> Integer,
            completed_count -> Integer,
            failed_count -> Integer,
            created_at -> Timestamp,
            completed_at -> Nullable<Timestamp>,
        }
    }

    diesel::table! {
        generation_requests (id) {
            id -> Uuid,
            batch_id -> Nullable<Uuid>,
            tenant_id -> Text,
            template_id -> Text,
            variant_id -> Text,
            version_id -> Nullable<Text>,
            environment_id -> Nullable<Text>,
            data -> Text,
            filename -> Nullable<Text>,
            correlation_id -> Nullable<Text>,
            document_id -> Nullable<Uuid>,
            status -> Text,
            claimed_by -> Nullable<Text>,
            claimed_at -> Nullable<Timestamp>,
            error_message -> Nullable<Text>,
            created_at -> Timestamp,
            started_at -> Nullable<Timestamp>,
            completed_at -> Nullable<Timestamp>,
            expires_at -> Nullable<Timestamp>,
        }
    }

    diesel::table! {
        generated_documents (id) {
            id -> Uuid,
            request_id -> Uuid,
            tenant_id -> Text,
            filename -> Text,
            content_type -> Text,
            size_bytes -> BigInt,
            content -> Binary,
            correlation_id -> Nullable<Text>,
            created_at -> Timestamp,
            expires_at -> Nullable<Timestamp>,
        }
    }

    diesel::allow_tables_to_appear_in_same_query!(
        generation_batches,
        generation_requests,
        generated_documents,
    );
}

pub mod sqlite {
    diesel::table! {
        generation_batches (id) {
            id -> Binary,
            tenant_id -> Text,
            total_count -> Integer,
            completed_count -> Integer,
            failed_count -> Integer,
            created_at -> Text,
            completed_at -> Nullable<Text>,
        }
    }

    diesel::table! {
        generation_requests (id) {
            id -> Binary,
            batch_id -> Nullable<Binary>,
            tenant_id -> Text,
            template_id -> Text,
            variant_id -> Text,
            version_id -> Nullable<Text>,
            environment_id -> Nullable<Text>,
            data -> Text,
            filename -> Nullable<Text>,
            correlation_id -> Nullable<Text>,
            document_id -> Nullable<Binary>,
            status -> Text,
            claimed_by -> Nullable<Text>,
            claimed_at -> Nullable<Text>,
            error_message -> Nullable<Text>,
            created_at -> Text,
            started_at -> Nullable<Text>,
            completed_at -> Nullable<Text>,
            expires_at -> Nullable<Text>,
        }
    }

    diesel::table! {
        generated_documents (id) {
            id -> Binary,
            request_id -> Binary,
            tenant_id -> Text,
            filename -> Text,
            content_type -> Text,
            size_bytes -> BigInt,
            content -> Binary,
            correlation_id -> Nullable<Text>,
            created_at -> Text,
            expires_at -> Nullable<Text>,
        }
    }

    diesel::allow_tables_to_appear_in_same_query!(
        generation_batches,
        generation_requests,
        generated_documents,
    );
}
