mod b2;
mod broker;

pub use b2::{
    AllowedBucket, ApiErrorBody, AuthorizeResponse, BucketInfo, ListBucketsRequest,
    ListBucketsResponse, NotificationRulesResponse, SetNotificationRulesRequest,
};
pub use broker::{EventBatch, SubscribeRequest, SubscribeResponse};
