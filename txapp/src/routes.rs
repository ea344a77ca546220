//! Built-in routes, one per payload type.

use tally_types::{
    Amount, Identity, Payload, PayloadType, Transaction, TxCode, TxContext, VotableEvent,
};
use tally_voting::{
    App, UpdatePowerRequest, START_MIGRATION, VALIDATOR_JOIN, VALIDATOR_REMOVE,
};

use crate::pricing::{
    body_price, vote_ids_price, TRANSFER_PRICE, VALIDATOR_APPROVE_PRICE, VALIDATOR_JOIN_PRICE,
    VALIDATOR_LEAVE_PRICE, VALIDATOR_REMOVE_PRICE, VALIDATOR_VOTE_ID_PRICE,
};
use crate::{Route, RouteError};

pub fn all() -> Vec<Box<dyn Route>> {
    vec![
        Box::new(TransferRoute),
        Box::new(ValidatorJoinRoute),
        Box::new(ValidatorApproveRoute),
        Box::new(ValidatorRemoveRoute),
        Box::new(ValidatorLeaveRoute),
        Box::new(ValidatorVoteIdsRoute),
        Box::new(ValidatorVoteBodiesRoute),
        Box::new(CreateResolutionRoute),
        Box::new(ApproveResolutionRoute),
    ]
}

fn wrong_payload(expected: PayloadType, tx: &Transaction) -> RouteError {
    RouteError::new(
        TxCode::InvalidTxType,
        format!("{expected} route received a {} payload", tx.payload_type()),
    )
}

/// `period` blocks past the current height.
fn expiry_after(ctx: &TxContext, period: i64) -> Result<i64, RouteError> {
    ctx.block.height.checked_add(period).ok_or_else(|| {
        RouteError::new(
            TxCode::UnknownError,
            format!("expiration period {period} overflows block height {}", ctx.block.height),
        )
    })
}

fn not_migrating(ctx: &TxContext, action: &str) -> Result<(), RouteError> {
    if ctx.params().migration_status.is_migrating() {
        return Err(RouteError::new(
            TxCode::NetworkInMigration,
            format!("cannot {action} during migration"),
        ));
    }
    Ok(())
}

fn require_validator(app: &App<'_>, who: &Identity) -> Result<(), RouteError> {
    if app.validators.get_power(who) <= 0 {
        return Err(RouteError::new(
            TxCode::InvalidSender,
            format!("{who} is not a validator"),
        ));
    }
    Ok(())
}

fn power_request(identity: &Identity, power: i64, ty: &str) -> Result<VotableEvent, RouteError> {
    let body = UpdatePowerRequest {
        identity: identity.clone(),
        power,
    }
    .encode()?;
    Ok(VotableEvent::new(ty, body))
}

pub struct TransferRoute;

impl Route for TransferRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::Transfer
    }

    fn price(&self, _tx: &Transaction) -> Result<Amount, RouteError> {
        Ok(TRANSFER_PRICE)
    }

    fn pre_tx(&self, ctx: &TxContext, _tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "transfer")
    }

    fn in_tx(&self, _ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        let Payload::Transfer { to, amount } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        app.accounts.transfer(&mut *app.db, &tx.sender, to, *amount)?;
        Ok(())
    }
}

pub struct ValidatorJoinRoute;

impl Route for ValidatorJoinRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::ValidatorJoin
    }

    fn price(&self, _tx: &Transaction) -> Result<Amount, RouteError> {
        Ok(VALIDATOR_JOIN_PRICE)
    }

    fn pre_tx(&self, ctx: &TxContext, tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "join the validator set")?;
        let Payload::ValidatorJoin { power } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        if *power == 0 || i64::try_from(*power).is_err() {
            return Err(RouteError::new(
                TxCode::InvalidAmount,
                format!("invalid join power {power}"),
            ));
        }
        Ok(())
    }

    fn in_tx(&self, ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        let Payload::ValidatorJoin { power } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        let power = i64::try_from(*power)
            .map_err(|_| RouteError::new(TxCode::InvalidAmount, "join power out of range"))?;

        if app.validators.get_power(&tx.sender) > 0 {
            return Err(RouteError::new(
                TxCode::InvalidSender,
                "caller is already a validator",
            ));
        }

        let pending = app
            .resolutions
            .ids_by_type_and_proposer(app.db.as_read(), VALIDATOR_JOIN, &tx.sender)?;
        if !pending.is_empty() {
            return Err(RouteError::new(
                TxCode::InvalidSender,
                "validator already has a pending join request",
            ));
        }

        let event = power_request(&tx.sender, power, VALIDATOR_JOIN)?;
        let expiry = expiry_after(ctx, ctx.params().join_expiry)?;
        app.resolutions
            .create(&mut *app.db, &event, expiry, &tx.sender)?;
        Ok(())
    }
}

pub struct ValidatorApproveRoute;

impl Route for ValidatorApproveRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::ValidatorApprove
    }

    fn price(&self, _tx: &Transaction) -> Result<Amount, RouteError> {
        Ok(VALIDATOR_APPROVE_PRICE)
    }

    fn pre_tx(&self, ctx: &TxContext, tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "approve a validator join")?;
        let Payload::ValidatorApprove { candidate } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        if *candidate == tx.sender {
            return Err(RouteError::new(
                TxCode::InvalidSender,
                "cannot approve own join request",
            ));
        }
        Ok(())
    }

    fn in_tx(&self, _ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        let Payload::ValidatorApprove { candidate } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };

        let pending = app
            .resolutions
            .ids_by_type_and_proposer(app.db.as_read(), VALIDATOR_JOIN, candidate)?;
        let id = match pending.as_slice() {
            [] => {
                return Err(RouteError::new(
                    TxCode::InvalidSender,
                    "candidate does not have a pending join request",
                ))
            }
            [id] => *id,
            _ => {
                return Err(RouteError::new(
                    TxCode::UnknownError,
                    "candidate has more than one pending join request",
                ))
            }
        };

        require_validator(app, &tx.sender)?;
        app.resolutions.approve(&mut *app.db, &id, &tx.sender)?;
        Ok(())
    }
}

pub struct ValidatorRemoveRoute;

impl Route for ValidatorRemoveRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::ValidatorRemove
    }

    fn price(&self, _tx: &Transaction) -> Result<Amount, RouteError> {
        Ok(VALIDATOR_REMOVE_PRICE)
    }

    fn pre_tx(&self, ctx: &TxContext, _tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "remove a validator")
    }

    fn in_tx(&self, ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        let Payload::ValidatorRemove { validator } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };

        require_validator(app, &tx.sender)?;
        if app.validators.get_power(validator) <= 0 {
            return Err(RouteError::new(
                TxCode::InvalidSender,
                format!("target {validator} is not a validator"),
            ));
        }

        let event = power_request(validator, 0, VALIDATOR_REMOVE)?;
        let id = event.id();
        if !app.resolutions.exists(app.db.as_read(), &id)? {
            let expiry = expiry_after(ctx, ctx.params().join_expiry)?;
            app.resolutions
                .create(&mut *app.db, &event, expiry, &tx.sender)?;
        }
        app.resolutions.approve(&mut *app.db, &id, &tx.sender)?;
        Ok(())
    }
}

pub struct ValidatorLeaveRoute;

impl Route for ValidatorLeaveRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::ValidatorLeave
    }

    fn price(&self, _tx: &Transaction) -> Result<Amount, RouteError> {
        Ok(VALIDATOR_LEAVE_PRICE)
    }

    fn pre_tx(&self, ctx: &TxContext, _tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "leave the validator set")
    }

    fn in_tx(&self, _ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        require_validator(app, &tx.sender)?;
        app.validators.set_power(&mut *app.db, &tx.sender, 0)?;
        Ok(())
    }
}

pub struct ValidatorVoteIdsRoute;

impl Route for ValidatorVoteIdsRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::ValidatorVoteIds
    }

    fn price(&self, tx: &Transaction) -> Result<Amount, RouteError> {
        let Payload::ValidatorVoteIds { resolution_ids } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        Ok(vote_ids_price(resolution_ids.len()))
    }

    fn pre_tx(&self, ctx: &TxContext, _tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "vote")
    }

    fn in_tx(&self, _ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        let Payload::ValidatorVoteIds { resolution_ids } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        require_validator(app, &tx.sender)?;

        let ids = app
            .resolutions
            .filter_not_processed(app.db.as_read(), resolution_ids)?;
        let from_local = app.is_local(&tx.sender);

        for id in &ids {
            app.resolutions.approve(&mut *app.db, id, &tx.sender)?;
            if from_local {
                app.events.delete_event(&mut *app.db, id)?;
            }
        }

        let too_late = resolution_ids.len() - ids.len();
        if too_late > 0 {
            tracing::warn!(too_late, "vote contains resolutions that are already processed");
        }
        Ok(())
    }
}

pub struct ValidatorVoteBodiesRoute;

impl Route for ValidatorVoteBodiesRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::ValidatorVoteBodies
    }

    fn price(&self, tx: &Transaction) -> Result<Amount, RouteError> {
        let Payload::ValidatorVoteBodies { events } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        let bytes = events.iter().map(|e| e.body.len()).fold(0usize, usize::saturating_add);
        Ok(body_price(bytes))
    }

    fn pre_tx(&self, ctx: &TxContext, tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "vote")?;
        if tx.sender != ctx.block.proposer {
            return Err(RouteError::new(
                TxCode::InvalidSender,
                "only the block proposer may submit vote bodies",
            ));
        }
        Ok(())
    }

    fn in_tx(&self, ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        let Payload::ValidatorVoteBodies { events } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        let from_local = app.is_local(&tx.sender);

        for event in events {
            let period = app.resolutions.registry().get(&event.event_type)?.expiration_period;
            let id = app.resolutions.create(
                &mut *app.db,
                event,
                expiry_after(ctx, period)?,
                &tx.sender,
            )?;
            app.resolutions.approve(&mut *app.db, &id, &tx.sender)?;
            if from_local {
                app.events.delete_event(&mut *app.db, &id)?;
            }
        }
        Ok(())
    }
}

pub struct CreateResolutionRoute;

impl Route for CreateResolutionRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::CreateResolution
    }

    fn price(&self, tx: &Transaction) -> Result<Amount, RouteError> {
        let Payload::CreateResolution { resolution } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        Ok(body_price(resolution.body.len()))
    }

    fn pre_tx(&self, ctx: &TxContext, tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "create a resolution")?;
        let Payload::CreateResolution { resolution } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        if ctx.params().migration_status.is_active()
            && resolution.event_type.eq_ignore_ascii_case(START_MIGRATION)
        {
            return Err(RouteError::new(
                TxCode::NetworkInMigration,
                "a migration is already scheduled, cannot accept new migration proposals",
            ));
        }
        Ok(())
    }

    fn in_tx(&self, ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        let Payload::CreateResolution { resolution } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        let period = app
            .resolutions
            .registry()
            .get(&resolution.event_type)
            .map_err(|e| RouteError::new(TxCode::InvalidResolutionType, e.to_string()))?
            .expiration_period;

        require_validator(app, &tx.sender)?;

        let id = app.resolutions.create(
            &mut *app.db,
            resolution,
            expiry_after(ctx, period)?,
            &tx.sender,
        )?;
        app.resolutions.approve(&mut *app.db, &id, &tx.sender)?;
        Ok(())
    }
}

pub struct ApproveResolutionRoute;

impl Route for ApproveResolutionRoute {
    fn payload_type(&self) -> PayloadType {
        PayloadType::ApproveResolution
    }

    fn price(&self, _tx: &Transaction) -> Result<Amount, RouteError> {
        Ok(VALIDATOR_VOTE_ID_PRICE)
    }

    fn pre_tx(&self, ctx: &TxContext, _tx: &Transaction) -> Result<(), RouteError> {
        not_migrating(ctx, "approve a resolution")
    }

    fn in_tx(&self, ctx: &TxContext, app: &mut App<'_>, tx: &Transaction) -> Result<(), RouteError> {
        let Payload::ApproveResolution { resolution_id } = tx.payload() else {
            return Err(wrong_payload(self.payload_type(), tx));
        };
        require_validator(app, &tx.sender)?;

        let Some(resolution) = app.resolutions.info(app.db.as_read(), resolution_id)? else {
            return Err(RouteError::new(
                TxCode::InvalidResolutionType,
                format!("resolution {resolution_id} does not exist"),
            ));
        };
        if ctx.params().migration_status.is_active()
            && resolution.resolution_type.eq_ignore_ascii_case(START_MIGRATION)
        {
            return Err(RouteError::new(
                TxCode::NetworkInMigration,
                "a migration is already scheduled, cannot approve migration proposals",
            ));
        }

        app.resolutions
            .approve(&mut *app.db, resolution_id, &tx.sender)?;
        Ok(())
    }
}
