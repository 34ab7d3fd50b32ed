//! Errors - プロバイダエラーの分類
//!
//! port は [`ApiError`]（service, code, message）をそのまま返します。
//! リトライするか、無視してよいか、致命的かはここでだけ判定します。
//!
//! # 分類
//! - **Retryable**: スロットリング、内部エラー、一時的な利用不可
//! - **Benign**: 使用中、既に存在しない、権限外、依存オブジェクトあり
//! - **Fatal**: それ以外すべて

use std::fmt;

use serde::{Deserialize, Serialize};

/// The cloud service an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    CodeBuild,
    Ec2,
    ElasticLoadBalancing,
    Ssm,
    CloudFormation,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::CodeBuild => "codebuild",
            Service::Ec2 => "ec2",
            Service::ElasticLoadBalancing => "elb",
            Service::Ssm => "ssm",
            Service::CloudFormation => "cloudformation",
        };
        f.write_str(name)
    }
}

/// An error returned by a provider API call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{service} {code}: {message}")]
pub struct ApiError {
    pub service: Service,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(service: Service, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        classify(self.service, &self.code, &self.message)
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Benign for a caller that tolerates any of `accepted`.
    pub fn is_benign_for(&self, accepted: &[BenignReason]) -> bool {
        matches!(self.class(), ErrorClass::Benign(reason) if accepted.contains(&reason))
    }
}

/// Operational classification of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttling or eventual-consistency lag; retry with backoff.
    Retryable,
    /// Expected during cleanup; log and treat as done.
    Benign(BenignReason),
    /// Anything else; abort the enclosing operation.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BenignReason {
    /// The resource is still in use by something outside our control.
    InUse,
    /// The resource no longer exists.
    AlreadyGone,
    /// The resource is outside what the caller's identity may manage.
    PermissionDenied,
    /// Another object still references the resource.
    DependentObject,
}

impl fmt::Display for BenignReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            BenignReason::InUse => "it is still in use",
            BenignReason::AlreadyGone => "it does not exist anymore",
            BenignReason::PermissionDenied => "we are not allowed to manage it",
            BenignReason::DependentObject => "it has a dependent object",
        };
        f.write_str(reason)
    }
}

const RETRYABLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottled",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
];

/// Map `(service, code, message)` to an [`ErrorClass`].
pub fn classify(service: Service, code: &str, message: &str) -> ErrorClass {
    if RETRYABLE_CODES.contains(&code) {
        return ErrorClass::Retryable;
    }

    match service {
        Service::Ec2 => classify_ec2(code, message),
        Service::CloudFormation
            if code == "ValidationError" && message.contains("does not exist") =>
        {
            ErrorClass::Benign(BenignReason::AlreadyGone)
        }
        Service::Ssm if code == "ParameterNotFound" => {
            ErrorClass::Benign(BenignReason::AlreadyGone)
        }
        Service::ElasticLoadBalancing if code == "LoadBalancerNotFound" => {
            ErrorClass::Benign(BenignReason::AlreadyGone)
        }
        _ => ErrorClass::Fatal,
    }
}

fn classify_ec2(code: &str, message: &str) -> ErrorClass {
    if code == "DependencyViolation" || message.contains("has a dependent object") {
        return ErrorClass::Benign(BenignReason::DependentObject);
    }
    if message.contains("is currently in use") {
        return ErrorClass::Benign(BenignReason::InUse);
    }
    if code.ends_with(".NotFound") || message.contains("does not exist") {
        return ErrorClass::Benign(BenignReason::AlreadyGone);
    }
    if code == "UnauthorizedOperation"
        || message.contains("You are not allowed to manage")
        || message.contains("You do not have permission to access the specified resource")
    {
        return ErrorClass::Benign(BenignReason::PermissionDenied);
    }
    ErrorClass::Fatal
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::throttled_codebuild(Service::CodeBuild, "ThrottlingException", "Rate exceeded")]
    #[case::ec2_limit(Service::Ec2, "RequestLimitExceeded", "Request limit exceeded.")]
    #[case::ssm_throttle(Service::Ssm, "TooManyRequestsException", "slow down")]
    fn throttling_is_retryable(#[case] service: Service, #[case] code: &str, #[case] message: &str) {
        assert_eq!(classify(service, code, message), ErrorClass::Retryable);
    }

    #[rstest]
    #[case::in_use(
        "InvalidNetworkInterface.InUse",
        "Interface: [eni-1] in use. The network interface 'eni-1' is currently in use.",
        BenignReason::InUse
    )]
    #[case::eni_gone(
        "InvalidNetworkInterfaceID.NotFound",
        "The networkInterface ID 'eni-1' does not exist",
        BenignReason::AlreadyGone
    )]
    #[case::sg_gone(
        "InvalidGroup.NotFound",
        "The security group 'sg-1' does not exist",
        BenignReason::AlreadyGone
    )]
    #[case::not_allowed(
        "OperationNotPermitted",
        "You are not allowed to manage 'ela-attach' attachments.",
        BenignReason::PermissionDenied
    )]
    #[case::no_permission(
        "AuthFailure",
        "You do not have permission to access the specified resource.",
        BenignReason::PermissionDenied
    )]
    #[case::dependent(
        "DependencyViolation",
        "resource sg-1 has a dependent object",
        BenignReason::DependentObject
    )]
    fn ec2_benign_messages(#[case] code: &str, #[case] message: &str, #[case] reason: BenignReason) {
        assert_eq!(classify(Service::Ec2, code, message), ErrorClass::Benign(reason));
    }

    #[test]
    fn unknown_errors_are_fatal() {
        assert_eq!(
            classify(Service::Ec2, "InvalidParameterValue", "bad filter"),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify(Service::CodeBuild, "AccessDeniedException", "denied"),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn missing_stack_is_benign_only_for_cloudformation() {
        let msg = "Stack with id orbit-dev does not exist";
        assert_eq!(
            classify(Service::CloudFormation, "ValidationError", msg),
            ErrorClass::Benign(BenignReason::AlreadyGone)
        );
        assert_eq!(
            classify(Service::CodeBuild, "ValidationError", msg),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn benign_for_respects_accepted_set() {
        let err = ApiError::new(Service::Ec2, "DependencyViolation", "has a dependent object");
        assert!(err.is_benign_for(&[BenignReason::DependentObject]));
        assert!(!err.is_benign_for(&[BenignReason::InUse, BenignReason::AlreadyGone]));
        assert!(!err.is_retryable());
    }
}
