use kube::CustomResourceExt;

use operator::S3Bucket;

fn main() -> anyhow::Result<()> {
  print!("{}", serde_yaml::to_string(&S3Bucket::crd())?);
  Ok(())
}
