// HAProxy configuration, passed through block by block.

use super::{Artifact, BagSet, PostAction, RenderPlan, RenderTarget};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::merge::LOAD_BALANCER_KEY;
use crate::model::ResourceType;
use crate::process::CommandSpec;

pub(super) fn plan(bags: &BagSet, config: &RouterConfig) -> Result<RenderPlan, CoreError> {
    let bag = bags.get(ResourceType::LoadBalancer);
    let blocks: Vec<String> = bag
        .entry(LOAD_BALANCER_KEY)
        .map_err(|e| CoreError::InvalidEntry {
            resource: ResourceType::LoadBalancer,
            key: LOAD_BALANCER_KEY.into(),
            reason: e.to_string(),
        })?
        .unwrap_or_default();

    // Nothing configured yet: leave the packaged config and service alone.
    if blocks.is_empty() {
        return Ok(RenderPlan {
            target: RenderTarget::LoadBalancer,
            artifacts: Vec::new(),
            action: PostAction::None,
        });
    }

    let mut contents = blocks.join("\n");
    if !contents.ends_with('\n') {
        contents.push('\n');
    }

    Ok(RenderPlan {
        target: RenderTarget::LoadBalancer,
        artifacts: vec![Artifact::new(&config.artifacts.haproxy_cfg, contents)
            .validated_by(CommandSpec::new("haproxy").args(["-c", "-f", "{}"]))],
        action: PostAction::Restart(config.services.load_balancer.clone()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DataBag;
    use serde_json::json;

    #[test]
    fn blocks_are_joined_with_trailing_newline() {
        let mut bag = DataBag::new(ResourceType::LoadBalancer);
        bag.insert(LOAD_BALANCER_KEY, json!(["global\n\tmaxconn 4096", "defaults\n\tmode tcp"]));
        let plan = plan(&BagSet::new().with(bag), &RouterConfig::rooted_at("/tmp/vr")).unwrap();
        assert_eq!(
            plan.artifacts[0].contents,
            "global\n\tmaxconn 4096\ndefaults\n\tmode tcp\n"
        );
        assert_eq!(plan.action, PostAction::Restart("haproxy".into()));
    }

    #[test]
    fn empty_configuration_renders_nothing() {
        let plan = plan(&BagSet::new(), &RouterConfig::rooted_at("/tmp/vr")).unwrap();
        assert!(plan.artifacts.is_empty());
        assert_eq!(plan.action, PostAction::None);
    }
}
