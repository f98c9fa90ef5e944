use serde_json::{Value, json};

pub(crate) const TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
pub(crate) const FUNCTION_PRINCIPAL: &str = "lambda.amazonaws.com";

pub(crate) const TASK_EXECUTION_POLICY: &str =
  "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";
pub(crate) const FUNCTION_EXECUTION_POLICY: &str =
  "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Trust policy letting one service principal assume a role.
pub(crate) fn assume_role_policy(principal: &str) -> Value {
  json!({
    "Version": "2012-10-17",
    "Statement": [{
      "Effect": "Allow",
      "Action": ["sts:AssumeRole"],
      "Principal": { "Service": [principal] },
    }],
  })
}
