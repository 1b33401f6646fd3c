use crate::infrastructure::request_log::RequestLog;
use crate::modules::user::domain::CreateUserRequest;
use crate::modules::user::service::UserService;
use serde_json::json;
use trestle::prelude::*;

#[derive(Injectable)]
pub struct UserController {
    service: Arc<UserService>,
    log: Arc<RequestLog>,
}

impl Controller for UserController {
    fn configure(c: &mut ControllerBuilder<Self>) {
        c.prefix("users");
        c.middleware(Arc::new(RequestLogger));

        c.route("create")
            .post("/users")
            .typed_body::<CreateUserRequest>(FormParser::Json, 0)
            .handler(|ctx, mut args| async move {
                let req: CreateUserRequest = args.take(0)?;
                let user = ctx.service.create(req).await;
                ctx.context().set_status(StatusCode::CREATED);
                Ok(JsonResult::new(user))
            });

        c.route("list").get("all").handler(|ctx, _| async move {
            let users = ctx.service.list().await;
            Ok(ActionResult::deferred(async move { JsonResult::new(users) }))
        });

        c.route("get_one")
            .get(":id")
            .param(0, "id")
            .pipes([Arc::new(RequireParamsPipe) as Arc<dyn Pipe>])
            .handler(|ctx, mut args| async move {
                let id: String = args.take(0)?;
                match ctx.service.get(&id).await {
                    Some(user) => Ok(JsonResult::new(user)),
                    None => {
                        ctx.context().set_status(StatusCode::NOT_FOUND);
                        Ok(JsonResult::new(json!({ "message": "user not found", "id": id })))
                    }
                }
            });

        c.route("trail")
            .get("/debug/trail")
            .handler(|ctx, _| async move {
                ctx.log.record("trail");
                Ok(ctx.log.entries().join("\n"))
            });
    }
}
