//! Frame handlers.
//!
//! Each handler parses its frame, performs the authorized operation, and
//! publishes the results through the fanout. Validation failures surface as
//! rejected operations; race losses are silent no-ops.

use quillstream_common::{ActorId, AppError, AppResult};
use quillstream_core::chat::ChatMessage;
use quillstream_core::{CastOutcome, FanoutMessage};
use quillstream_realtime::keys;
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

use crate::dispatch::HandlerFuture;
use crate::messages::{
    BacklogFrame, ChatFrame, KillOptionFrame, ThreadFrame, VoteConfigFrame, VoteOptionFrame,
    VoteRefFrame, WriteinFrame,
};
use crate::ws::ConnContext;

fn parse<T: DeserializeOwned>(frame: Value) -> AppResult<T> {
    serde_json::from_value(frame).map_err(|e| AppError::BadRequest(e.to_string()))
}

fn require_author(ctx: &ConnContext) -> AppResult<()> {
    if ctx.is_author {
        Ok(())
    } else {
        Err(AppError::Forbidden("story author only".to_string()))
    }
}

/// Broadcast a vote's current state to the room.
///
/// With hidden tallies, the public broadcast omits counts and a privileged
/// variant carrying them goes to the author's identity key only.
async fn broadcast_vote(ctx: &ConnContext, vote_id: i64) -> AppResult<()> {
    let snapshot = ctx.state.engine.render_state(vote_id, None, false).await?;
    let channel_id = snapshot.channel_id;
    let html = ctx.state.renderer.render_vote(&snapshot);
    let hidden = snapshot.votes_hidden;

    ctx.state
        .fanout
        .publish(
            &keys::room(channel_id),
            &FanoutMessage::VoteRendered {
                vote_id,
                channel_id,
                html,
                vote: snapshot,
            },
        )
        .await;

    if hidden && let Some(author_id) = ctx.state.guard.story_author(channel_id).await? {
        let privileged = ctx.state.engine.render_state(vote_id, None, true).await?;
        let html = ctx.state.renderer.render_vote(&privileged);
        ctx.state
            .fanout
            .publish(
                &keys::identity(&ActorId::registered(author_id)),
                &FanoutMessage::VoteRendered {
                    vote_id,
                    channel_id,
                    html,
                    vote: privileged,
                },
            )
            .await;
    }
    Ok(())
}

/// Send cast/retraction notices to the acting voter's identity key.
async fn ack_outcome(ctx: &ConnContext, vote_id: i64, option_id: i64, outcome: CastOutcome) {
    let identity = keys::identity(&ctx.actor);
    if let Some(previous) = outcome.retracted_from {
        ctx.state
            .fanout
            .publish(
                &identity,
                &FanoutMessage::VoteCastAck {
                    vote_id,
                    channel_id: ctx.channel_id,
                    option_id: previous,
                    voted: false,
                },
            )
            .await;
    }
    ctx.state
        .fanout
        .publish(
            &identity,
            &FanoutMessage::VoteCastAck {
                vote_id,
                channel_id: ctx.channel_id,
                option_id,
                voted: true,
            },
        )
        .await;
}

pub fn chat_msg(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        let frame: ChatFrame = parse(frame)?;
        frame
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let message = ChatMessage::new(
            frame.msg,
            frame.id_token,
            ctx.channel_id,
            ctx.actor.clone(),
            ctx.user_name.clone(),
            frame.thread_id,
        );

        // A duplicate delivery changes nothing and broadcasts nothing.
        if ctx.state.chat.append(&message).await? {
            ctx.state
                .fanout
                .publish(
                    &keys::room(ctx.channel_id),
                    &FanoutMessage::ChatPosted {
                        message: message.to_broadcast(false),
                    },
                )
                .await;
        }
        Ok(())
    })
}

pub fn backlog(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        let _: BacklogFrame = parse(frame)?;
        let messages = ctx.state.chat.recent(ctx.channel_id).await?;
        for message in messages {
            ctx.state
                .fanout
                .publish(
                    &ctx.ws_key,
                    &FanoutMessage::ChatPosted {
                        message: message.to_broadcast(false),
                    },
                )
                .await;
        }
        Ok(())
    })
}

pub fn thread(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        let frame: ThreadFrame = parse(frame)?;
        let messages = ctx.state.chat.thread(ctx.channel_id, frame.thread).await?;
        for message in messages {
            ctx.state
                .fanout
                .publish(
                    &ctx.ws_key,
                    &FanoutMessage::ChatPosted {
                        message: message.to_broadcast(false),
                    },
                )
                .await;
        }
        Ok(())
    })
}

pub fn cast_vote(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        let frame: VoteOptionFrame = parse(frame)?;
        let outcome = ctx
            .state
            .engine
            .cast(frame.vote, frame.option, &ctx.actor)
            .await?;
        if outcome.changed {
            ack_outcome(&ctx, frame.vote, frame.option, outcome).await;
            broadcast_vote(&ctx, frame.vote).await?;
        }
        Ok(())
    })
}

pub fn retract_vote(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        let frame: VoteOptionFrame = parse(frame)?;
        let removed = ctx
            .state
            .engine
            .retract(frame.vote, frame.option, &ctx.actor)
            .await?;
        if removed {
            ctx.state
                .fanout
                .publish(
                    &keys::identity(&ctx.actor),
                    &FanoutMessage::VoteCastAck {
                        vote_id: frame.vote,
                        channel_id: ctx.channel_id,
                        option_id: frame.option,
                        voted: false,
                    },
                )
                .await;
            broadcast_vote(&ctx, frame.vote).await?;
        }
        Ok(())
    })
}

pub fn add_writein(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        let frame: WriteinFrame = parse(frame)?;
        frame
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let (option_id, outcome) = ctx
            .state
            .engine
            .add_writein(frame.vote, &frame.text, &ctx.actor)
            .await?;
        ack_outcome(&ctx, frame.vote, option_id, outcome).await;
        broadcast_vote(&ctx, frame.vote).await
    })
}

pub fn kill_option(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        require_author(&ctx)?;
        let frame: KillOptionFrame = parse(frame)?;
        ctx.state
            .engine
            .set_option_killed(frame.vote, frame.option, frame.killed, frame.reason.as_deref())
            .await?;
        broadcast_vote(&ctx, frame.vote).await
    })
}

pub fn set_vote_config(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        require_author(&ctx)?;
        let frame: VoteConfigFrame = parse(frame)?;
        ctx.state.engine.set_config(frame.vote, &frame.update).await?;
        broadcast_vote(&ctx, frame.vote).await
    })
}

pub fn close_vote(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        require_author(&ctx)?;
        let frame: VoteRefFrame = parse(frame)?;
        // A `false` here means another closer won the race; their fold and
        // notifications stand.
        let _ = ctx.state.engine.close(frame.vote, true, true).await?;
        Ok(())
    })
}

pub fn open_vote(ctx: ConnContext, frame: Value) -> HandlerFuture {
    Box::pin(async move {
        require_author(&ctx)?;
        let frame: VoteRefFrame = parse(frame)?;
        let state = ctx.state.engine.reopen(frame.vote).await?;
        ctx.state
            .fanout
            .publish(
                &keys::room(state.channel_id),
                &FanoutMessage::VoteOpenChanged {
                    vote_id: frame.vote,
                    channel_id: state.channel_id,
                    open: true,
                },
            )
            .await;
        broadcast_vote(&ctx, frame.vote).await
    })
}
