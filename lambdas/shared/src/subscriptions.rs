//! Pattern email subscriptions

use tracing::info;

use crate::errors::{Error, Result};
use crate::models::{ListSubscriptionsResponse, Subscription, SubscriptionRequest};
use crate::store::{PatternStore, SubscriptionStore};
use crate::validation::is_valid_email;

pub struct SubscriptionService<'a> {
    pub subscriptions: &'a dyn SubscriptionStore,
    pub patterns: &'a dyn PatternStore,
}

fn check_email(email: &str) -> Result<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(Error::Validation(format!("email '{}' is invalid", email)))
    }
}

impl<'a> SubscriptionService<'a> {
    pub async fn subscribe(&self, request: SubscriptionRequest) -> Result<Subscription> {
        let email = request.email.trim().to_lowercase();
        check_email(&email)?;

        if self.patterns.get_pattern(&request.pattern_id).await?.is_none() {
            return Err(Error::PatternNotFound(request.pattern_id));
        }

        let subscription = Subscription::new(request.pattern_id, email);
        self.subscriptions.put_subscription(&subscription).await?;
        info!(pattern_id = %subscription.pattern_id, "Added subscription");
        Ok(subscription)
    }

    pub async fn unsubscribe(&self, request: SubscriptionRequest) -> Result<()> {
        let email = request.email.trim().to_lowercase();
        check_email(&email)?;

        if self
            .subscriptions
            .get_subscription(&request.pattern_id, &email)
            .await?
            .is_none()
        {
            return Err(Error::SubscriptionNotFound(format!("{}/{}", request.pattern_id, email)));
        }

        self.subscriptions
            .delete_subscription(&request.pattern_id, &email)
            .await?;
        info!(pattern_id = %request.pattern_id, "Removed subscription");
        Ok(())
    }

    /// One subscription when an email is given, otherwise all of the pattern's
    pub async fn query(&self, pattern_id: &str, email: Option<&str>) -> Result<ListSubscriptionsResponse> {
        let results = match email {
            Some(email) => {
                let email = email.trim().to_lowercase();
                let subscription = self
                    .subscriptions
                    .get_subscription(pattern_id, &email)
                    .await?
                    .ok_or_else(|| Error::SubscriptionNotFound(format!("{}/{}", pattern_id, email)))?;
                vec![subscription]
            }
            None => self.subscriptions.list_subscriptions(pattern_id).await?,
        };

        Ok(ListSubscriptionsResponse { results })
    }
}
