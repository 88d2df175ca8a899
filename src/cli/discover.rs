use super::run::RunError;
use crate::aws::AwsClients;
use crate::config::Config;
use crate::discovery::{find_tagged_endpoints, Endpoint};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

/// Print the tagged distributions as a tab-indented JSON array.
pub async fn discover(config: &Config) -> Result<(), RunError> {
    let clients = AwsClients::connect(&config.aws.region).await;
    let tag_names = config.discovery.tag_names();
    let endpoints = find_tagged_endpoints(clients.catalog.as_ref(), &tag_names.as_slice()).await?;

    println!("{}", render_endpoints(&endpoints)?);
    Ok(())
}

pub fn render_endpoints(endpoints: &[Endpoint]) -> Result<String, serde_json::Error> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
    endpoints.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
