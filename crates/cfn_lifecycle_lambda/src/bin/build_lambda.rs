use std::sync::Arc;

use cfn_lifecycle_lambda::adapters::build_service::CodeBuildService;
use cfn_lifecycle_lambda::handlers::build::BuildProvider;
use cfn_lifecycle_lambda::runtime::{serve, ColdStart};
use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cold_start = ColdStart::load().await;
    let builds = CodeBuildService::new(aws_sdk_codebuild::Client::new(&cold_start.sdk_config));
    serve(cold_start, BuildProvider::new(Arc::new(builds))).await
}
