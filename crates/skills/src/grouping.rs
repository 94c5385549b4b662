//! Grouping skills: group, move, and delete sets of whiteboard objects as a
//! unit. Each returns a single tagged action for the front-end.

use serde::Deserialize;
use serde_json::Value;

use tg_domain::canvas::WhiteboardAction;
use tg_domain::context::TutorContext;
use tg_domain::error::Error;

use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

#[derive(Debug, Deserialize)]
struct GroupObjectsArgs {
    group_id: String,
    object_ids: Vec<String>,
}

pub fn group_objects<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: GroupObjectsArgs = parse_args("group_objects", args)?;
        if args.object_ids.is_empty() {
            return Err(Error::ToolInput(
                "group_objects: object_ids must not be empty".into(),
            ));
        }
        Ok(SkillOutput::Action(WhiteboardAction::GroupObjects {
            group_id: args.group_id,
            object_ids: args.object_ids,
        }))
    })
}

#[derive(Debug, Deserialize)]
struct MoveGroupArgs {
    group_id: String,
    dx_pct: f64,
    dy_pct: f64,
}

pub fn move_group<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: MoveGroupArgs = parse_args("move_group", args)?;
        Ok(SkillOutput::Action(WhiteboardAction::MoveGroup {
            group_id: args.group_id,
            dx_pct: args.dx_pct,
            dy_pct: args.dy_pct,
        }))
    })
}

#[derive(Debug, Deserialize)]
struct DeleteGroupArgs {
    group_id: String,
}

pub fn delete_group<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DeleteGroupArgs = parse_args("delete_group", args)?;
        Ok(SkillOutput::Action(WhiteboardAction::DeleteGroup {
            group_id: args.group_id,
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::test_services;
    use uuid::Uuid;

    #[tokio::test]
    async fn group_requires_members() {
        let services = test_services();
        let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
        let err = group_objects(
            &mut ctx,
            &services,
            serde_json::json!({"group_id": "g", "object_ids": []}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ToolInput(_)));
    }

    #[tokio::test]
    async fn move_group_emits_pct_deltas() {
        let services = test_services();
        let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
        let out = move_group(
            &mut ctx,
            &services,
            serde_json::json!({"group_id": "g", "dx_pct": 0.05, "dy_pct": -0.1}),
        )
        .await
        .unwrap();
        match out {
            SkillOutput::Action(WhiteboardAction::MoveGroup {
                dx_pct, dy_pct, ..
            }) => {
                assert_eq!(dx_pct, 0.05);
                assert_eq!(dy_pct, -0.1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
