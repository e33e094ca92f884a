use anyhow::{bail, Context as _};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::{
  api::Api,
  runtime::{
    controller::{self, Action, Controller},
    watcher,
  },
  Client,
};
use log::{debug, error, info, warn};
use std::sync::Arc;

use operator::{
  aws::AwsGateway,
  config::OperatorConfig,
  controller::{reconcile, Context},
  events::KubeRecorder,
  store::KubeStore,
  Error, ResourceId, S3Bucket,
};

struct State {
  ctx: Context,
  config: OperatorConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  env_logger::init();

  let config = OperatorConfig::from_env();
  debug!("Loaded config: {:?}", config);

  // outside a cluster, fall back to the configured kubeconfig context
  let client = match Client::try_default().await {
    Ok(c) => c,
    _ => {
      use kube::config::KubeConfigOptions;
      use std::convert::TryFrom;

      match &config.kube_context {
        Some(ctx) => Client::try_from(
          kube::Config::from_kubeconfig(&KubeConfigOptions {
            context: Some(ctx.clone()),
            ..KubeConfigOptions::default()
          })
          .await?,
        )
        .context("Failed to load KUBE_CTX context")?,

        _ => bail!("Failed to create client"),
      }
    }
  };

  let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
  let store = Arc::new(KubeStore::new(client.clone(), &config.field_manager));
  let ctx = Context {
    gateway: Arc::new(AwsGateway::new(&sdk_config)),
    resources: store.clone(),
    secrets: store,
    recorder: Arc::new(KubeRecorder::new(client.clone(), &config.field_manager)),
  };

  let (crd, secrets, services) = match &config.watch_namespace {
    Some(ns) => (
      Api::<S3Bucket>::namespaced(client.clone(), ns),
      Api::<Secret>::namespaced(client.clone(), ns),
      Api::<Service>::namespaced(client.clone(), ns),
    ),
    None => (Api::all(client.clone()), Api::all(client.clone()), Api::all(client)),
  };
  info!(
    "Watching S3Bucket resources in {}",
    config.watch_namespace.as_deref().unwrap_or("all namespaces")
  );

  Controller::new(crd, watcher::Config::default())
    .owns(secrets, watcher::Config::default())
    .owns(services, watcher::Config::default())
    .run(
      run_pass,
      |_, err, state: Arc<State>| {
        warn!("Requeueing after error: {}", err);
        Action::requeue(state.config.error_requeue)
      },
      Arc::new(State { ctx, config }),
    )
    .for_each(|res| async move {
      match res {
        Ok(o) => {
          info!("Reconciled {:?}", o);
        }
        Err(controller::Error::ObjectNotFound(or)) => {
          info!("Object not found: {:?}", or);
        }
        Err(e) => {
          error!("Reconcile failed: {:?}", e);
        }
      }
    })
    .await;

  Ok(())
}

async fn run_pass(bucket: Arc<S3Bucket>, state: Arc<State>) -> Result<Action, Error> {
  let id = ResourceId::from_resource(&bucket)?;
  debug!("Reconcile for: {}", id);
  reconcile(&id, &state.ctx).await.into_action(state.config.resync_interval)
}
