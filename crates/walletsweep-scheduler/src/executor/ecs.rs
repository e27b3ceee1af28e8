use crate::config::EcsSettings;
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, Task, TaskOverride,
};
use chrono::{DateTime, Utc};
use walletsweep_core::{
    executor::{ClusterExecutor, LaunchOutcome, LaunchRequest, TaskDescription},
    Error, ExitInfo, Result, TaskHandle, TaskStatus,
};

/// `DescribeTasks` accepts at most this many task ARNs per call.
const DESCRIBE_BATCH: usize = 100;

/// Fargate tasks on an ECS cluster.
#[derive(Debug, Clone)]
pub struct EcsExecutor {
    client: aws_sdk_ecs::Client,
    settings: EcsSettings,
}

impl EcsExecutor {
    pub fn new(client: aws_sdk_ecs::Client, settings: EcsSettings) -> Self {
        Self { client, settings }
    }

    pub async fn from_env(settings: EcsSettings) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()))
            .load()
            .await;
        Self::new(aws_sdk_ecs::Client::new(&config), settings)
    }

    fn network_configuration(&self) -> anyhow::Result<NetworkConfiguration> {
        let vpc = AwsVpcConfiguration::builder()
            .subnets(&self.settings.subnet)
            .assign_public_ip(AssignPublicIp::Enabled)
            .build()
            .context("build awsvpc configuration")?;
        Ok(NetworkConfiguration::builder()
            .awsvpc_configuration(vpc)
            .build())
    }
}

#[async_trait]
impl ClusterExecutor for EcsExecutor {
    async fn run_task(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        let environment = request
            .env
            .iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect::<Vec<_>>();

        let overrides = TaskOverride::builder()
            .container_overrides(
                ContainerOverride::builder()
                    .name(&self.settings.container_name)
                    .set_environment(Some(environment))
                    .build(),
            )
            .build();

        let resp = self
            .client
            .run_task()
            .cluster(&self.settings.cluster)
            .task_definition(&self.settings.task_definition)
            .group(&request.group)
            .count(1)
            .launch_type(LaunchType::Fargate)
            .network_configuration(self.network_configuration().map_err(Error::Executor)?)
            .overrides(overrides)
            .send()
            .await
            .with_context(|| {
                format!(
                    "ecs RunTask cluster={} group={}",
                    self.settings.cluster, request.group
                )
            })
            .map_err(Error::Executor)?;

        let handles = resp
            .tasks()
            .iter()
            .filter_map(|task| task.task_arn().map(TaskHandle::new))
            .collect();
        let failures = resp
            .failures()
            .iter()
            .map(|f| {
                format!(
                    "arn={} reason={} detail={}",
                    f.arn().unwrap_or("-"),
                    f.reason().unwrap_or("-"),
                    f.detail().unwrap_or("-")
                )
            })
            .collect();

        Ok(LaunchOutcome { handles, failures })
    }

    async fn describe_tasks(&self, handles: &[TaskHandle]) -> Result<Vec<TaskDescription>> {
        let mut out = Vec::with_capacity(handles.len());
        for batch in handles.chunks(DESCRIBE_BATCH) {
            let resp = self
                .client
                .describe_tasks()
                .cluster(&self.settings.cluster)
                .set_tasks(Some(batch.iter().map(|h| h.as_str().to_string()).collect()))
                .send()
                .await
                .with_context(|| {
                    format!(
                        "ecs DescribeTasks cluster={} tasks={}",
                        self.settings.cluster,
                        batch.len()
                    )
                })
                .map_err(Error::Executor)?;

            out.extend(resp.tasks().iter().filter_map(describe));
        }
        Ok(out)
    }
}

fn describe(task: &Task) -> Option<TaskDescription> {
    let handle = TaskHandle::new(task.task_arn()?);
    let last_status = task.last_status().unwrap_or_default().to_string();
    let status = TaskStatus::from_executor(&last_status).unwrap_or_else(|| {
        tracing::warn!(
            event = "walletsweep.executor.ecs.unknown_status",
            handle = %handle,
            last_status = %last_status,
            "unrecognised task status; treating as pending"
        );
        TaskStatus::Pending
    });

    let container = task.containers().first();
    let exit = ExitInfo {
        exit_code: container.and_then(|c| c.exit_code()),
        stopped_reason: task.stopped_reason().map(str::to_string),
        container_reason: container.and_then(|c| c.reason()).map(str::to_string),
        started_at: task.started_at().and_then(to_chrono),
        stopping_at: task.stopping_at().and_then(to_chrono),
        stopped_at: task.stopped_at().and_then(to_chrono),
    };

    Some(TaskDescription {
        handle,
        last_status,
        status,
        exit,
    })
}

fn to_chrono(ts: &aws_sdk_ecs::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())
}
