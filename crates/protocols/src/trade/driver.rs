//! Runs a role machine against a framed stream and the chain.

use std::io;
use std::sync::Arc;

use pintswap_chain::{wait_for_receipt, Approval, TransactionRequest};
use pintswap_codec::{CodecError, FramedStream};
use pintswap_types::{Offer, PeerId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{TradeError, TradeResult};
use crate::network::PeerStream;
use crate::trade::machine::{Action, ActionResult, Input, TradeMachine};
use crate::trade::{TradeContext, TradeEvent, TradeHandle, TradeOutcome};

/// Run `machine` over `stream` on a new task.
pub fn spawn_trade<S>(
    machine: impl Into<TradeMachine>,
    stream: S,
    peer: PeerId,
    ctx: Arc<TradeContext>,
) -> TradeHandle
where
    S: PeerStream + 'static,
{
    let machine = machine.into();
    let id = Uuid::new_v4();
    let role = machine.role();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    let span = info_span!("trade", trade_id = %id, role = %role, peer = %peer);
    tokio::spawn(
        async move {
            let result = run_trade(machine, stream, &ctx, events_tx).await;
            let _ = done_tx.send(result);
        }
        .instrument(span),
    );

    TradeHandle {
        id,
        role,
        peer,
        events: events_rx,
        completion: done_rx,
    }
}

async fn run_trade<S: PeerStream>(
    mut machine: TradeMachine,
    stream: S,
    ctx: &TradeContext,
    events: mpsc::UnboundedSender<TradeEvent>,
) -> TradeResult<TradeOutcome> {
    let mut framed = FramedStream::new(stream);
    let mut reserved: Vec<Offer> = Vec::new();

    info!("trade started");
    let result = drive(&mut machine, &mut framed, ctx, &mut reserved, &events).await;

    if let Err(e) = &result {
        error!(state = machine.state(), error = %e, "trade failed");
        if !reserved.is_empty() {
            ctx.orderbook.restore(&reserved).await;
            warn!(offers = reserved.len(), "restored reserved offers");
        }
    }
    if let Err(e) = framed.close().await {
        debug!(error = %e, "stream already closed");
    }
    result
}

async fn drive<S: PeerStream>(
    machine: &mut TradeMachine,
    framed: &mut FramedStream<S>,
    ctx: &TradeContext,
    reserved: &mut Vec<Offer>,
    events: &mpsc::UnboundedSender<TradeEvent>,
) -> TradeResult<TradeOutcome> {
    let mut input = Input::Start;
    loop {
        let step = machine.advance(input)?;

        for out in &step.outbound {
            debug!(frame = ?out.frame, len = out.payload.len(), "sending frame");
            framed.write_frame(&out.payload).await.map_err(stream_error)?;
        }
        for event in step.events {
            info!(event = ?event, "trade progress");
            let _ = events.send(event);
        }
        if step.done {
            return machine
                .outcome()
                .ok_or(TradeError::UnexpectedInput("completing"));
        }

        input = match step.action {
            Some(action) => Input::Action(perform(action, ctx, reserved).await?),
            None => {
                let expected = machine.expected_frame();
                let payload = framed
                    .read_frame()
                    .await
                    .map_err(stream_error)?
                    .ok_or(TradeError::CounterpartyAbort)?;
                debug!(frame = ?expected, len = payload.len(), "received frame");
                Input::Frame(payload)
            }
        };
    }
}

async fn perform(
    action: Action,
    ctx: &TradeContext,
    reserved: &mut Vec<Offer>,
) -> TradeResult<ActionResult> {
    let chain = &ctx.chain;
    match action {
        Action::LookupOffers(hashes) => {
            let mut found = Vec::with_capacity(hashes.len());
            for hash in &hashes {
                found.push(ctx.orderbook.get(hash).await);
            }
            Ok(ActionResult::Offers(found))
        }
        Action::ReserveOffers(hashes) => {
            let offers = ctx.orderbook.reserve(&hashes).await?;
            *reserved = offers.clone();
            Ok(ActionResult::Reserved(offers))
        }
        Action::FetchNonce(shared) => Ok(ActionResult::Nonce(
            chain.provider.transaction_count(shared).await?,
        )),
        Action::Approve {
            token,
            amount,
            spender,
        } => match chain.approver.approve(token, amount, spender).await? {
            Approval::Transaction(hash) => {
                chain.wallet.wait_for_transaction(hash).await?;
                Ok(ActionResult::Approved(None))
            }
            Approval::Permit(permit) => Ok(ActionResult::Approved(Some(permit))),
        },
        Action::BuildTransaction { params, shared } => Ok(ActionResult::Built(
            chain.builder.prepare(&params, shared).await?,
        )),
        Action::FundSharedAddress { shared, amount } => {
            let hash = chain
                .wallet
                .send_transaction(TransactionRequest {
                    to: shared,
                    value: amount,
                    data: Vec::new(),
                })
                .await?;
            info!(tx = ?hash, shared = ?shared, amount = %amount, "funding shared address");
            chain.wallet.wait_for_transaction(hash).await?;
            Ok(ActionResult::Funded)
        }
        Action::Broadcast { raw, rebate } => {
            let hash = if rebate {
                chain.relay.send_raw_transaction(&raw).await?
            } else {
                chain.provider.send_raw_transaction(&raw).await?
            };
            info!(tx = ?hash, rebate, "broadcast settlement transaction");
            Ok(ActionResult::Broadcast(hash))
        }
        Action::AwaitReceipt(hash) => Ok(ActionResult::Receipt(
            wait_for_receipt(chain.provider.as_ref(), hash, chain.receipt_poll_interval).await?,
        )),
        Action::FinalizeOffers(hashes) => {
            ctx.orderbook.finalize(&hashes).await;
            reserved.clear();
            Ok(ActionResult::Finalized)
        }
    }
}

/// A peer that hung up shows up as a clean EOF, a broken pipe or a frame cut
/// short; anything else is a failure of our own stream.
fn stream_error(e: CodecError) -> TradeError {
    match e {
        CodecError::Truncated(_) => TradeError::CounterpartyAbort,
        CodecError::Io(e)
            if matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::UnexpectedEof
            ) =>
        {
            TradeError::CounterpartyAbort
        }
        CodecError::Io(e) => TradeError::StreamClosed(e.to_string()),
        other => TradeError::Codec(other),
    }
}
