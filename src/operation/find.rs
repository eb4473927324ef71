use super::{Hooks, Operation, operation_common};
use crate::hooks::{StaticHookCall, call_instance_hooks, call_static_before};
use crate::maybe_async::MaybeAsync;
use crate::model::{InstanceHooks, ModelRef, RelationValue};
use crate::query::{QueryBuilder, UserContext};
use crate::result::QueryResult;

/// Added to every find query before it runs. Calls the `before_find` and
/// `after_find` hooks.
#[derive(Debug, Clone)]
pub struct FindOperation {
    name: String,
}

impl FindOperation {
    pub fn new() -> Self {
        Self {
            name: "find".to_string(),
        }
    }
}

impl Default for FindOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for FindOperation {
    operation_common!(Hooks::ON_BEFORE2 | Hooks::ON_AFTER3);

    fn on_before2(&mut self, builder: &mut QueryBuilder) -> MaybeAsync<()> {
        call_static_before(builder, &*self, |class, args| class.before_find(args))
    }

    fn on_after3(&mut self, builder: &mut QueryBuilder, result: QueryResult) -> MaybeAsync<QueryResult> {
        let options = builder.internal_options();
        if options.dont_call_find_hooks {
            return MaybeAsync::ok(result);
        }

        let instance = call_after_find(result.models(), &builder.context(), options.call_after_find_deeply);
        let static_hook = StaticHookCall::new(builder, &*self);
        instance.and_then(move |()| static_hook.after(result, |class, args| class.after_find(args)))
    }
}

fn call_after_find(models: &[ModelRef], ctx: &UserContext, deep: bool) -> MaybeAsync<()> {
    let related = if deep {
        let nested = models
            .iter()
            .flat_map(|model| model.relations())
            .map(|(_, value)| match value {
                RelationValue::One(model) => call_after_find(model.as_slice(), ctx, true),
                RelationValue::Many(models) => call_after_find(&models, ctx, true),
            })
            .collect::<Vec<_>>();
        MaybeAsync::map_after_all_return(nested, ())
    } else {
        MaybeAsync::ok(())
    };

    let own = call_instance_hooks(models, InstanceHooks::AFTER_FIND, |class, model| {
        class.model_after_find(model, ctx)
    });
    MaybeAsync::map_after_all_return([related, own], ())
}
