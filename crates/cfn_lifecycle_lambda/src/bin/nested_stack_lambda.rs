use std::sync::Arc;

use cfn_lifecycle_lambda::adapters::stack_service::CloudFormationStackServiceFactory;
use cfn_lifecycle_lambda::handlers::nested_stack::NestedStackProvider;
use cfn_lifecycle_lambda::runtime::{serve, ColdStart};
use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cold_start = ColdStart::load().await;
    let stacks = CloudFormationStackServiceFactory::new(cold_start.sdk_config.clone());
    serve(cold_start, NestedStackProvider::new(Arc::new(stacks))).await
}
